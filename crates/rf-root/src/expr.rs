//! Selection expressions over TTree branches.
//!
//! The grammar follows C operator precedence:
//!
//! ```text
//! ||   &&   == !=   < <= > >=   + -   * / %   unary - !   call / atom
//! ```
//!
//! Identifiers name branches and may contain `.`; a call such as
//! `TMath::Sqrt(x)` is accepted with or without the `TMath::` prefix.
//! Every value is an `f64`. Comparisons and logical operators yield `1.0` or
//! `0.0`, and a value counts as true when it is non-zero and not NaN.

use crate::error::{Result, RootError};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Op {
    /// Binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Op::Or => 1,
            Op::And => 2,
            Op::Eq | Op::Ne => 3,
            Op::Lt | Op::Le | Op::Gt | Op::Ge => 4,
            Op::Add | Op::Sub => 5,
            Op::Mul | Op::Div | Op::Rem => 6,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Or => flag(truthy(a) || truthy(b)),
            Op::And => flag(truthy(a) && truthy(b)),
            Op::Eq => flag(a == b),
            Op::Ne => flag(a != b),
            Op::Lt => flag(a < b),
            Op::Le => flag(a <= b),
            Op::Gt => flag(a > b),
            Op::Ge => flag(a >= b),
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
            Op::Rem => a % b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Log10,
    Exp,
    Pow,
    Min,
    Max,
    Sin,
    Cos,
    Tan,
    Atan2,
    Floor,
    Ceil,
    Hypot,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("TMath::").unwrap_or(name);
        let f = match bare.to_ascii_lowercase().as_str() {
            "abs" | "fabs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "exp" => Func::Exp,
            "pow" | "power" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "atan2" => Func::Atan2,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "hypot" => Func::Hypot,
            _ => return None,
        };
        Some(f)
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max | Func::Atan2 | Func::Hypot => 2,
            _ => 1,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Func::Abs => a.abs(),
            Func::Sqrt => a.sqrt(),
            Func::Log => a.ln(),
            Func::Log10 => a.log10(),
            Func::Exp => a.exp(),
            Func::Pow => a.powf(b),
            Func::Min => a.min(b),
            Func::Max => a.max(b),
            Func::Sin => a.sin(),
            Func::Cos => a.cos(),
            Func::Tan => a.tan(),
            Func::Atan2 => a.atan2(b),
            Func::Floor => a.floor(),
            Func::Ceil => a.ceil(),
            Func::Hypot => a.hypot(b),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Num(f64),
    Var(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Bin(Op, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// A compiled expression ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    root: Node,
    /// Branch names referenced by the expression, in order of first occurrence.
    pub required_branches: Vec<String>,
}

impl CompiledExpr {
    /// Parse an expression string.
    pub fn compile(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens: &tokens, pos: 0, vars: Vec::new() };
        let root = parser.expr(0)?;
        if let Some(tok) = parser.peek() {
            return Err(RootError::Expression(format!("unexpected {} after expression", tok)));
        }
        Ok(Self { root, required_branches: parser.vars })
    }

    /// Evaluate for one row; `values` follows the order of `required_branches`.
    pub fn eval_row(&self, values: &[f64]) -> f64 {
        eval_scalar(&self.root, values)
    }

    /// Evaluate over `n_rows` rows, one column per required branch.
    pub fn eval_bulk(&self, columns: &[&[f64]], n_rows: usize) -> Result<Vec<f64>> {
        if columns.len() != self.required_branches.len() {
            return Err(RootError::Expression(format!(
                "expression needs {} columns, got {}",
                self.required_branches.len(),
                columns.len()
            )));
        }
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != n_rows) {
            return Err(RootError::Expression(format!(
                "column '{}' has {} rows, expected {}",
                self.required_branches[i],
                col.len(),
                n_rows
            )));
        }
        Ok(eval_columns(&self.root, columns, n_rows))
    }

    /// Evaluate as a row selection: `true` where the value is non-zero and not NaN.
    pub fn eval_mask(&self, columns: &[&[f64]], n_rows: usize) -> Result<Vec<bool>> {
        Ok(self.eval_bulk(columns, n_rows)?.into_iter().map(truthy).collect())
    }
}

fn eval_scalar(node: &Node, vals: &[f64]) -> f64 {
    match node {
        Node::Num(n) => *n,
        Node::Var(i) => vals.get(*i).copied().unwrap_or(f64::NAN),
        Node::Neg(a) => -eval_scalar(a, vals),
        Node::Not(a) => flag(!truthy(eval_scalar(a, vals))),
        Node::Bin(op, a, b) => op.apply(eval_scalar(a, vals), eval_scalar(b, vals)),
        Node::Call(f, args) => {
            let a = eval_scalar(&args[0], vals);
            let b = args.get(1).map_or(f64::NAN, |n| eval_scalar(n, vals));
            f.apply(a, b)
        }
    }
}

/// Column-at-a-time evaluation; every returned vector has `n` rows.
fn eval_columns(node: &Node, cols: &[&[f64]], n: usize) -> Vec<f64> {
    match node {
        Node::Num(v) => vec![*v; n],
        Node::Var(i) => cols[*i].to_vec(),
        Node::Neg(a) => {
            let mut v = eval_columns(a, cols, n);
            v.iter_mut().for_each(|x| *x = -*x);
            v
        }
        Node::Not(a) => {
            let mut v = eval_columns(a, cols, n);
            v.iter_mut().for_each(|x| *x = flag(!truthy(*x)));
            v
        }
        Node::Bin(op, a, b) => {
            let mut lhs = eval_columns(a, cols, n);
            let rhs = eval_columns(b, cols, n);
            lhs.iter_mut().zip(&rhs).for_each(|(x, &y)| *x = op.apply(*x, y));
            lhs
        }
        Node::Call(f, args) => {
            let mut a = eval_columns(&args[0], cols, n);
            match args.get(1) {
                Some(second) => {
                    let b = eval_columns(second, cols, n);
                    a.iter_mut().zip(&b).for_each(|(x, &y)| *x = f.apply(*x, y));
                }
                None => a.iter_mut().for_each(|x| *x = f.apply(*x, f64::NAN)),
            }
            a
        }
    }
}

// ── Tokens ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(Op),
    Minus,
    Not,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "number {}", n),
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::Op(op) => write!(f, "operator {:?}", op),
            Token::Minus => f.write_str("'-'"),
            Token::Not => f.write_str("'!'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        let pair = match (c, next) {
            ('&', Some('&')) => Some(Op::And),
            ('|', Some('|')) => Some(Op::Or),
            ('=', Some('=')) => Some(Op::Eq),
            ('!', Some('=')) => Some(Op::Ne),
            ('<', Some('=')) => Some(Op::Le),
            ('>', Some('=')) => Some(Op::Ge),
            _ => None,
        };
        if let Some(op) = pair {
            chars.next();
            tokens.push(Token::Op(op));
            continue;
        }

        let tok = match c {
            _ if c.is_whitespace() => continue,
            '<' => Token::Op(Op::Lt),
            '>' => Token::Op(Op::Gt),
            '!' => Token::Not,
            '+' => Token::Op(Op::Add),
            '-' => Token::Minus,
            '*' => Token::Op(Op::Mul),
            '/' => Token::Op(Op::Div),
            '%' => Token::Op(Op::Rem),
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            _ if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut end = start + c.len_utf8();
                let mut prev = c;
                while let Some(&(i, d)) = chars.peek() {
                    let exp_sign = (d == '+' || d == '-') && matches!(prev, 'e' | 'E');
                    if !(d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exp_sign) {
                        break;
                    }
                    end = i + d.len_utf8();
                    prev = d;
                    chars.next();
                }
                let text = &input[start..end];
                let n = text
                    .parse()
                    .map_err(|_| RootError::Expression(format!("invalid number '{}'", text)))?;
                Token::Num(n)
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' || d == '.' || d == ':' {
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(input[start..end].to_string())
            }
            _ => {
                return Err(RootError::Expression(format!(
                    "unexpected character '{}' at offset {}",
                    c, start
                )));
            }
        };
        tokens.push(tok);
    }

    Ok(tokens)
}

// ── Parser (precedence climbing) ───────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    vars: Vec<String>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += usize::from(tok.is_some());
        tok
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        match self.bump() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(RootError::Expression(format!("expected {}, found {}", want, tok))),
            None => Err(RootError::Expression(format!("expected {}, found end of input", want))),
        }
    }

    /// Binary operator at the cursor (a leading `-` is subtraction here).
    fn peek_op(&self) -> Option<Op> {
        match self.peek()? {
            Token::Op(op) => Some(*op),
            Token::Minus => Some(Op::Sub),
            _ => None,
        }
    }

    fn expr(&mut self, min_prec: u8) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op().filter(|op| op.precedence() > min_prec) {
            self.pos += 1;
            let rhs = self.expr(op.precedence())?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Node::Not(Box::new(self.unary()?)))
            }
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Node> {
        match self.bump() {
            Some(Token::Num(n)) => Ok(Node::Num(n)),
            Some(Token::LParen) => {
                let inner = self.expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                self.call(&name)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Node::Num(1.0)),
                "false" => Ok(Node::Num(0.0)),
                _ => Ok(Node::Var(self.var(name))),
            },
            Some(tok) => Err(RootError::Expression(format!("unexpected {}", tok))),
            None => Err(RootError::Expression("unexpected end of expression".into())),
        }
    }

    fn call(&mut self, name: &str) -> Result<Node> {
        let func = Func::lookup(name)
            .ok_or_else(|| RootError::Expression(format!("unknown function '{}'", name)))?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            args.push(self.expr(0)?);
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                args.push(self.expr(0)?);
            }
        }
        self.expect(Token::RParen)?;
        if args.len() != func.arity() {
            return Err(RootError::Expression(format!(
                "{} takes {} argument(s), got {}",
                name,
                func.arity(),
                args.len()
            )));
        }
        Ok(Node::Call(func, args))
    }

    fn var(&mut self, name: String) -> usize {
        match self.vars.iter().position(|v| *v == name) {
            Some(i) => i,
            None => {
                self.vars.push(name);
                self.vars.len() - 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(src: &str, vals: &[f64]) -> f64 {
        CompiledExpr::compile(src).unwrap().eval_row(vals)
    }

    #[test]
    fn precedence_follows_c() {
        assert_relative_eq!(eval("2 + 3 * 4", &[]), 14.0);
        assert_relative_eq!(eval("(2 + 3) * 4", &[]), 20.0);
        assert_relative_eq!(eval("10 - 4 - 3", &[]), 3.0);
        assert_relative_eq!(eval("17 % 5 * 2", &[]), 4.0);
        assert_relative_eq!(eval("1 + 2 > 2 && 0 || 1", &[]), 1.0);
        assert_relative_eq!(eval("-2 * -3", &[]), 6.0);
    }

    #[test]
    fn variables_in_first_occurrence_order() {
        let e = CompiledExpr::compile("pt * w + pt > jet.eta").unwrap();
        assert_eq!(e.required_branches, vec!["pt", "w", "jet.eta"]);
        assert_relative_eq!(e.eval_row(&[10.0, 2.0, 5.0]), 1.0);
    }

    #[test]
    fn comparisons_and_logic() {
        let e = CompiledExpr::compile("njet >= 4 && pt_lead > 25.0").unwrap();
        assert_relative_eq!(e.eval_row(&[4.0, 30.0]), 1.0);
        assert_relative_eq!(e.eval_row(&[3.0, 30.0]), 0.0);
        assert_relative_eq!(eval("!(x > 3)", &[2.0]), 1.0);
        assert_relative_eq!(eval("x != 3", &[3.0]), 0.0);
        // negative values are true
        assert_relative_eq!(eval("x && 1", &[-1.0]), 1.0);
    }

    #[test]
    fn functions_and_root_aliases() {
        assert_relative_eq!(eval("sqrt(x)", &[9.0]), 3.0);
        assert_relative_eq!(eval("TMath::Sqrt(x)", &[16.0]), 4.0);
        assert_relative_eq!(eval("TMath::Power(x, 2)", &[3.0]), 9.0);
        assert_relative_eq!(eval("TMath::Abs(x)", &[-3.5]), 3.5);
        assert_relative_eq!(eval("max(a, b)", &[3.0, 7.0]), 7.0);
        assert_relative_eq!(eval("hypot(3, 4)", &[]), 5.0);
        assert_relative_eq!(eval("log10(1000)", &[]), 3.0);
        assert_relative_eq!(eval("floor(2.7) + ceil(2.2)", &[]), 5.0);
    }

    #[test]
    fn bad_input_is_an_error() {
        for src in ["", "1 +", "(1", "foo(1)", "sqrt(1, 2)", "x $ y", "1 2"] {
            assert!(CompiledExpr::compile(src).is_err(), "{src:?} should not compile");
        }
    }

    #[test]
    fn scientific_notation() {
        assert_relative_eq!(eval("1.5e2 + 3.0E-1", &[]), 150.3);
        assert_relative_eq!(eval(".5 * 4", &[]), 2.0);
    }

    #[test]
    fn bulk_matches_row_evaluation() {
        let e = CompiledExpr::compile("a * 2 > b || !a").unwrap();
        let a = [1.0, 2.0, 0.0, 5.0];
        let b = [3.0, 3.0, 9.0, 11.0];
        let bulk = e.eval_bulk(&[&a, &b], 4).unwrap();
        for i in 0..4 {
            assert_relative_eq!(bulk[i], e.eval_row(&[a[i], b[i]]));
        }
        assert_eq!(e.eval_mask(&[&a, &b], 4).unwrap(), vec![false, true, true, false]);
    }

    #[test]
    fn constants_broadcast_and_nan_is_false() {
        let e = CompiledExpr::compile("1").unwrap();
        assert_eq!(e.eval_mask(&[], 3).unwrap(), vec![true; 3]);
        let e = CompiledExpr::compile("x / x").unwrap();
        assert_eq!(e.eval_mask(&[&[0.0, 2.0]], 2).unwrap(), vec![false, true]);
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let e = CompiledExpr::compile("a + b").unwrap();
        assert!(e.eval_bulk(&[&[1.0]], 1).is_err());
        assert!(e.eval_bulk(&[&[1.0], &[1.0, 2.0]], 1).is_err());
    }
}
