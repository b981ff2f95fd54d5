//! Human-number arithmetic
//!
//! Numbers may carry a `$` prefix, thousands separators and a magnitude
//! suffix (`K`, `M`, `B`, `T`, any case, optionally after one space). Supported operators are
//! `+ - * /` (also `×`, `÷`, `−`), parentheses and unary minus.
//!
//! A percent literal on the right of an operator is relative to the left
//! operand:
//!
//! | expression | value          |
//! |------------|----------------|
//! | `A + B%`   | `A * (1 + B/100)` |
//! | `A - B%`   | `A * (1 - B/100)` |
//! | `A * B%`   | `A * B/100`    |
//! | `A / B%`   | `A / (B/100)`  |
//! | `B%`       | `B/100`        |

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{AttemptResult, Strategy};
use crate::error::{Error, Result};
use crate::routing::StrategyKind;

const FAST_PATH_CHARS: &str = "+-*/()%.,$×÷−KMBTkmbt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number { value: f64, percent: bool },
    Op(BinOp),
    LParen,
    RParen,
    /// Anything that cannot be part of an expression
    Break,
}

fn magnitude(c: char) -> Option<f64> {
    match c.to_ascii_uppercase() {
        'K' => Some(1e3),
        'M' => Some(1e6),
        'B' => Some(1e9),
        'T' => Some(1e12),
        _ => None,
    }
}

/// Lex a number starting at `start`
///
/// `None` when no digit follows; a `Break` token when the literal is malformed.
fn lex_number(chars: &[char], start: usize) -> Option<(Token, usize)> {
    let len = chars.len();
    let mut i = start;

    if chars[i] == '$' {
        i += 1;
        while i < len && chars[i] == ' ' {
            i += 1;
        }
    }

    let mut literal = String::new();
    while i < len {
        let c = chars[i];
        if c.is_ascii_digit() || c == '.' {
            literal.push(c);
            i += 1;
        } else if c == ',' && !literal.is_empty() && i + 1 < len && chars[i + 1].is_ascii_digit() {
            i += 1;
        } else {
            break;
        }
    }

    if !literal.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let Ok(mut value) = literal.parse::<f64>() else {
        return Some((Token::Break, i));
    };

    // Suffix may be separated by one space: `3 B`
    let suffix_at = if i + 1 < len && chars[i] == ' ' { i + 1 } else { i };
    if suffix_at < len {
        if let Some(scale) = magnitude(chars[suffix_at]) {
            let standalone = suffix_at + 1 >= len || !chars[suffix_at + 1].is_alphanumeric();
            if standalone {
                value *= scale;
                i = suffix_at + 1;
            }
        }
    }

    let mut percent = false;
    if i < len && chars[i] == '%' {
        percent = true;
        i += 1;
    }

    Some((Token::Number { value, percent }, i))
}

fn lex(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let simple = match chars[i] {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Some(Token::Op(BinOp::Add)),
            '-' | '−' => Some(Token::Op(BinOp::Sub)),
            '*' | '×' => Some(Token::Op(BinOp::Mul)),
            '/' | '÷' => Some(Token::Op(BinOp::Div)),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => None,
        };

        let (token, next) = match simple {
            Some(token) => (token, i + 1),
            None => lex_number(&chars, i).unwrap_or((Token::Break, i + 1)),
        };

        // Collapse runs of unrelated text into one break
        if !(token == Token::Break && tokens.last() == Some(&Token::Break)) {
            tokens.push(token);
        }
        i = next;
    }

    tokens
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Value(f64),
    Percent(f64),
}

impl Operand {
    fn value(self) -> f64 {
        match self {
            Self::Value(v) => v,
            Self::Percent(p) => p / 100.0,
        }
    }

    fn negate(self) -> Self {
        match self {
            Self::Value(v) => Self::Value(-v),
            Self::Percent(p) => Self::Percent(-p),
        }
    }
}

fn apply(left: f64, op: BinOp, right: Operand) -> Result<f64> {
    let division_by_zero = || Error::ArithmeticEval("division by zero".to_string());

    let result = match (op, right) {
        (BinOp::Add, Operand::Percent(p)) => left + left * p / 100.0,
        (BinOp::Sub, Operand::Percent(p)) => left - left * p / 100.0,
        (BinOp::Mul, Operand::Percent(p)) => left * p / 100.0,
        (BinOp::Div, Operand::Percent(p)) => {
            if p == 0.0 {
                return Err(division_by_zero());
            }
            left * 100.0 / p
        }
        (BinOp::Add, r) => left + r.value(),
        (BinOp::Sub, r) => left - r.value(),
        (BinOp::Mul, r) => left * r.value(),
        (BinOp::Div, r) => {
            let divisor = r.value();
            if divisor == 0.0 {
                return Err(division_by_zero());
            }
            left / divisor
        }
    };

    if !result.is_finite() {
        return Err(Error::ArithmeticEval("result is not a finite number".to_string()));
    }
    Ok(result)
}

/// Recursive-descent evaluator over one run of expression tokens
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    binary_ops: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            binary_ops: 0,
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn parse(mut self) -> Result<(f64, usize)> {
        if self.tokens.is_empty() {
            return Err(Error::ArithmeticParse("empty expression".to_string()));
        }
        let value = self.expr()?.value();
        if self.pos != self.tokens.len() {
            return Err(Error::ArithmeticParse(format!(
                "unexpected token at position {}",
                self.pos
            )));
        }
        Ok((value, self.binary_ops))
    }

    fn expr(&mut self) -> Result<Operand> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ (BinOp::Add | BinOp::Sub))) = self.peek() {
            self.pos += 1;
            let right = self.term()?;
            left = Operand::Value(apply(left.value(), op, right)?);
            self.binary_ops += 1;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Operand> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ (BinOp::Mul | BinOp::Div))) = self.peek() {
            self.pos += 1;
            let right = self.unary()?;
            left = Operand::Value(apply(left.value(), op, right)?);
            self.binary_ops += 1;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Operand> {
        match self.peek() {
            Some(Token::Op(BinOp::Sub)) => {
                self.pos += 1;
                Ok(self.unary()?.negate())
            }
            Some(Token::Op(BinOp::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Operand> {
        match self.peek() {
            Some(Token::Number { value, percent }) => {
                self.pos += 1;
                Ok(if percent {
                    Operand::Percent(value)
                } else {
                    Operand::Value(value)
                })
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                if self.peek() != Some(Token::RParen) {
                    return Err(Error::ArithmeticParse("missing closing parenthesis".to_string()));
                }
                self.pos += 1;
                Ok(Operand::Value(inner.value()))
            }
            Some(other) => Err(Error::ArithmeticParse(format!("unexpected {:?}", other))),
            None => Err(Error::ArithmeticParse("unexpected end of expression".to_string())),
        }
    }
}

/// Evaluate a complete expression such as `97B + 20%`
pub fn evaluate(expression: &str) -> Result<f64> {
    let tokens = lex(expression);
    if tokens.contains(&Token::Break) {
        return Err(Error::ArithmeticParse(format!(
            "'{}' is not an arithmetic expression",
            expression.trim()
        )));
    }
    Parser::new(&tokens).parse().map(|(value, _)| value)
}

/// Value of the first arithmetic expression embedded in `text`
///
/// Only runs with at least one binary operator count, so a bare year or
/// quantity is not an expression. Runs that do not parse are skipped;
/// evaluation faults such as division by zero are returned.
pub fn find_expression(text: &str) -> Result<Option<f64>> {
    let tokens = lex(text);
    for run in tokens.split(|t| *t == Token::Break) {
        if run.is_empty() {
            continue;
        }
        match Parser::new(run).parse() {
            Ok((value, ops)) if ops > 0 => return Ok(Some(value)),
            Ok(_) => {}
            Err(e @ Error::ArithmeticEval(_)) => return Err(e),
            Err(e) => debug!(error = %e, "Skipping non-expression run"),
        }
    }
    Ok(None)
}

/// Value of `text` when it consists of nothing but an arithmetic expression
pub fn pure_expression_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let allowed = text
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || FAST_PATH_CHARS.contains(c));
    if !allowed || !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let tokens = lex(text);
    if tokens.contains(&Token::Break) {
        return None;
    }
    match Parser::new(&tokens).parse() {
        Ok((value, ops)) if ops > 0 => Some(value),
        _ => None,
    }
}

/// Whether `text` is only an arithmetic expression that evaluates
pub fn is_pure_expression(text: &str) -> bool {
    pure_expression_value(text).is_some()
}

/// Integer form when the value is integral, otherwise up to six decimals
pub fn format_plain_number(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 && value.abs() < 1e15 {
        return format!("{}", value.round() as i64);
    }
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// `97000000000.0` becomes `97.0B`
pub fn format_human_number(value: f64) -> String {
    let abs = value.abs();
    for (unit, scale) in [("T", 1e12), ("B", 1e9), ("M", 1e6), ("K", 1e3)] {
        if abs >= scale {
            return format!("{:.1}{}", value / scale, unit);
        }
    }
    format!("{:.2}", value)
}

/// Answer text for a computed value
pub fn format_answer(value: f64) -> String {
    let plain = format_plain_number(value);
    if value.abs() >= 1e3 {
        format!("{} ({})", plain, format_human_number(value))
    } else {
        plain
    }
}

/// Evaluates arithmetic found in the question
#[derive(Debug, Clone, Default)]
pub struct ArithmeticStrategy;

impl ArithmeticStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Strategy for ArithmeticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Arithmetic
    }

    async fn attempt(&self, question: &str) -> Result<AttemptResult> {
        let started = Instant::now();
        let result = match find_expression(question)? {
            Some(value) => AttemptResult::answered(format_answer(value), Vec::new()),
            None => AttemptResult::empty(),
        };
        Ok(result.with_latency(started.elapsed().as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> f64 {
        evaluate(expr).unwrap()
    }

    #[test]
    fn test_percent_rules() {
        assert_eq!(eval("97B + 20%"), 116_400_000_000.0);
        assert_eq!(eval("97B - 20%"), 77_600_000_000.0);
        assert_eq!(eval("50 * 20%"), 10.0);
        assert_eq!(eval("50 / 20%"), 250.0);
        assert_eq!(eval("20%"), 0.2);
    }

    #[test]
    fn test_percent_applies_to_whole_left_operand() {
        assert_eq!(eval("2 * 10 + 50%"), 30.0);
        assert_eq!(eval("(100 + 100) - 25%"), 150.0);
    }

    #[test]
    fn test_magnitudes_and_separators() {
        assert_eq!(eval("12M + 3.5B"), 3_512_000_000.0);
        assert_eq!(eval("$1,234 * 2"), 2468.0);
        assert_eq!(eval("5k + 1T"), 1_000_000_005_000.0);
        assert_eq!(eval("$ 2.5m"), 2_500_000.0);
        assert_eq!(eval("$3 B + 2"), 3_000_000_002.0);
        assert_eq!(eval("12 M * 2"), 24_000_000.0);
    }

    #[test]
    fn test_precedence_and_unary() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("-(5 - 8) * 2"), 6.0);
        assert_eq!(eval("12M × 3"), 36_000_000.0);
        assert_eq!(eval("9 ÷ 3"), 3.0);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(evaluate("10 / 0"), Err(Error::ArithmeticEval(_))));
        assert!(matches!(evaluate("10 / 0%"), Err(Error::ArithmeticEval(_))));
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(matches!(evaluate("(1 + 2"), Err(Error::ArithmeticParse(_))));
        assert!(matches!(evaluate("1 +"), Err(Error::ArithmeticParse(_))));
        assert!(matches!(evaluate("one + two"), Err(Error::ArithmeticParse(_))));
        assert!(matches!(evaluate(""), Err(Error::ArithmeticParse(_))));
    }

    #[test]
    fn test_find_expression_in_question() {
        assert_eq!(
            find_expression("What is 97B + 20% of growth?").unwrap(),
            Some(116_400_000_000.0)
        );
        assert_eq!(find_expression("Tesla 2024 revenue").unwrap(), None);
        assert_eq!(find_expression("the 5th book").unwrap(), None);
        assert_eq!(find_expression("5k users").unwrap(), None);
        assert_eq!(find_expression("5 miles + 2").unwrap(), None);
        assert_eq!(find_expression("revenue of $3 B + 20%").unwrap(), Some(3_600_000_000.0));
        assert!(find_expression("split 10 / 0 ways").is_err());
    }

    #[test]
    fn test_pure_expression() {
        assert!(is_pure_expression("97B + 20%"));
        assert!(is_pure_expression(" (12M + 3.5B) / 2 "));
        assert!(!is_pure_expression("Tesla 2024"));
        assert!(!is_pure_expression("2024"));
        assert!(!is_pure_expression("5 / 0"));
        assert!(!is_pure_expression("+"));
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_human_number(97e9), "97.0B");
        assert_eq!(format_human_number(1500.0), "1.5K");
        assert_eq!(format_human_number(-2.5e6), "-2.5M");
        assert_eq!(format_human_number(12.345), "12.35");

        assert_eq!(format_plain_number(116_400_000_000.0), "116400000000");
        assert_eq!(format_plain_number(0.2), "0.2");
        assert_eq!(format_plain_number(-0.0), "0");
        assert_eq!(format_plain_number(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_answer_text() {
        assert_eq!(format_answer(116_400_000_000.0), "116400000000 (116.4B)");
        assert_eq!(format_answer(14.0), "14");
    }

    #[tokio::test]
    async fn test_strategy_attempt() {
        let strategy = ArithmeticStrategy::new();
        assert_eq!(strategy.kind(), StrategyKind::Arithmetic);

        let result = strategy.attempt("97B + 20%").await.unwrap();
        assert!(result.is_answer());
        assert_eq!(result.answer.as_deref(), Some("116400000000 (116.4B)"));

        let none = strategy.attempt("who runs tesla").await.unwrap();
        assert_eq!(none.answer, None);
        assert!(!none.succeeded);

        assert!(strategy.attempt("10 / 0").await.is_err());
    }
}
