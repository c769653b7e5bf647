//! Per-box placement formulas.
//!
//! A pattern formula has the shape `"<H|V>;<xExpr>;<yExpr>;<clusterRef>"`.
//! The coordinate expressions are linear combinations of the box length `l`
//! and width `w`, e.g. `"2l-0.5w"`. They are tokenized with logos and folded
//! directly into a [`LinearExpr`]; nothing is ever executed as code.

use logos::Logos;

use crate::error::FormulaError;
use crate::model::BoxOrient;
use crate::types::{EPSILON_GENERAL, Vec2};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
enum Token {
    #[regex(r"[0-9]+(\.[0-9]*)?|\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("l", ignore(case))]
    Length,
    #[token("w", ignore(case))]
    Width,
}

/// Linear combination `l * length + w * width + constant`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LinearExpr {
    pub l: f64,
    pub w: f64,
    pub constant: f64,
}

impl LinearExpr {
    /// Evaluates the expression for concrete box dimensions.
    pub fn eval(&self, length: f64, width: f64) -> f64 {
        self.l * length + self.w * width + self.constant
    }

    /// Coefficient of one variable.
    pub fn coeff(&self, var: Var) -> f64 {
        match var {
            Var::Length => self.l,
            Var::Width => self.w,
        }
    }
}

/// Formula variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Var {
    Length,
    Width,
}

impl Var {
    pub fn other(self) -> Self {
        match self {
            Var::Length => Var::Width,
            Var::Width => Var::Length,
        }
    }
}

#[derive(Clone, Copy)]
enum State {
    Start,
    AfterSign(f64),
    AfterNumber(f64, f64),
    AfterVar,
}

/// Parses a coordinate expression into its coefficients.
///
/// Whitespace is skipped; every other character outside
/// `{digits, '.', '+', '-', l, w, L, W}` is rejected.
pub fn parse_expr(expr: &str) -> Result<LinearExpr, FormulaError> {
    let malformed = |reason| FormulaError::Malformed {
        expr: expr.to_string(),
        reason,
    };

    let mut acc = LinearExpr::default();
    let mut state = State::Start;
    let mut lexer = Token::lexer(expr);

    while let Some(token) = lexer.next() {
        let token = match token {
            Ok(token) => token,
            Err(()) => {
                return Err(FormulaError::UnsupportedToken {
                    expr: expr.to_string(),
                    token: lexer.slice().to_string(),
                });
            }
        };

        state = match (state, token) {
            (State::Start, Token::Plus) => State::AfterSign(1.0),
            (State::Start, Token::Minus) => State::AfterSign(-1.0),
            (State::Start, Token::Number(n)) => State::AfterNumber(1.0, n),
            (State::Start, Token::Length) => {
                acc.l += 1.0;
                State::AfterVar
            }
            (State::Start, Token::Width) => {
                acc.w += 1.0;
                State::AfterVar
            }
            (State::AfterSign(_), Token::Plus | Token::Minus) => {
                return Err(malformed("consecutive signs"));
            }
            (State::AfterSign(sign), Token::Number(n)) => State::AfterNumber(sign, n),
            (State::AfterSign(sign), Token::Length) => {
                acc.l += sign;
                State::AfterVar
            }
            (State::AfterSign(sign), Token::Width) => {
                acc.w += sign;
                State::AfterVar
            }
            (State::AfterNumber(sign, n), Token::Length) => {
                acc.l += sign * n;
                State::AfterVar
            }
            (State::AfterNumber(sign, n), Token::Width) => {
                acc.w += sign * n;
                State::AfterVar
            }
            (State::AfterNumber(sign, n), Token::Plus) => {
                acc.constant += sign * n;
                State::AfterSign(1.0)
            }
            (State::AfterNumber(sign, n), Token::Minus) => {
                acc.constant += sign * n;
                State::AfterSign(-1.0)
            }
            (State::AfterNumber(..), Token::Number(_)) => {
                return Err(malformed("missing operator between numbers"));
            }
            (State::AfterVar, Token::Plus) => State::AfterSign(1.0),
            (State::AfterVar, Token::Minus) => State::AfterSign(-1.0),
            (State::AfterVar, _) => return Err(malformed("missing operator after variable")),
        };
    }

    match state {
        State::AfterSign(_) => Err(malformed("dangling sign")),
        State::AfterNumber(sign, n) => {
            acc.constant += sign * n;
            Ok(acc)
        }
        State::Start | State::AfterVar => Ok(acc),
    }
}

/// Evaluates a coordinate expression for concrete box dimensions.
///
/// # Examples
/// ```
/// use pallet_pattern::formula::evaluate;
///
/// assert_eq!(evaluate("2l-0.5w", 100.0, 50.0).unwrap(), 175.0);
/// assert_eq!(evaluate("", 100.0, 50.0).unwrap(), 0.0);
/// ```
pub fn evaluate(expr: &str, length: f64, width: f64) -> Result<f64, FormulaError> {
    Ok(parse_expr(expr)?.eval(length, width))
}

/// Parsed form of a full pattern formula.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    pub orient: BoxOrient,
    pub x: LinearExpr,
    pub y: LinearExpr,
    pub cluster: Option<String>,
}

impl Formula {
    /// Parses `"<H|V>;<xExpr>;<yExpr>;<clusterRef>"`.
    ///
    /// The cluster field may be empty or missing entirely.
    pub fn parse(formula: &str) -> Result<Self, FormulaError> {
        let mut fields = formula.split(';');
        let missing = |field| FormulaError::MissingField {
            formula: formula.to_string(),
            field,
        };

        let orient_field = fields.next().map(str::trim).unwrap_or_default();
        let orient = match orient_field {
            "H" | "h" => BoxOrient::H,
            "V" | "v" => BoxOrient::V,
            "" => return Err(missing("orientation")),
            other => return Err(FormulaError::InvalidOrient(other.to_string())),
        };
        let x = parse_expr(fields.next().ok_or_else(|| missing("x"))?)?;
        let y = parse_expr(fields.next().ok_or_else(|| missing("y"))?)?;
        let cluster = fields
            .next()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Self {
            orient,
            x,
            y,
            cluster,
        })
    }

    /// Box origin for the given box dimensions.
    pub fn origin(&self, length: f64, width: f64) -> Vec2 {
        Vec2::new(self.x.eval(length, width), self.y.eval(length, width))
    }

    /// Checks whether two expressions are equal coefficient by coefficient.
    pub fn same_expr(a: &LinearExpr, b: &LinearExpr) -> bool {
        (a.l - b.l).abs() < EPSILON_GENERAL
            && (a.w - b.w).abs() < EPSILON_GENERAL
            && (a.constant - b.constant).abs() < EPSILON_GENERAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON_GENERAL
    }

    #[test]
    fn evaluates_mixed_coefficients() {
        assert!(close(evaluate("2l-0.5w", 100.0, 50.0).unwrap(), 175.0));
        assert!(close(evaluate("1.5L+2W", 100.0, 50.0).unwrap(), 250.0));
    }

    #[test]
    fn empty_expression_is_zero() {
        assert_eq!(evaluate("", 400.0, 300.0).unwrap(), 0.0);
        assert_eq!(evaluate("  ", 400.0, 300.0).unwrap(), 0.0);
        assert_eq!(evaluate("0", 400.0, 300.0).unwrap(), 0.0);
    }

    #[test]
    fn bare_variables_have_unit_coefficients() {
        assert!(close(evaluate("l", 100.0, 50.0).unwrap(), 100.0));
        assert!(close(evaluate("-w", 100.0, 50.0).unwrap(), -50.0));
        assert!(close(evaluate("l-w", 100.0, 50.0).unwrap(), 50.0));
    }

    #[test]
    fn repeated_terms_compose_additively() {
        assert!(close(
            evaluate("l+l", 100.0, 0.0).unwrap(),
            evaluate("2l", 100.0, 0.0).unwrap()
        ));
        let expr = parse_expr("w+0.5w-l").unwrap();
        assert!(close(expr.w, 1.5));
        assert!(close(expr.l, -1.0));
    }

    #[test]
    fn numeric_constants_are_offsets() {
        let expr = parse_expr("l+20").unwrap();
        assert!(close(expr.constant, 20.0));
        assert!(close(expr.eval(400.0, 300.0), 420.0));
    }

    #[test]
    fn rejects_unsupported_tokens() {
        let err = evaluate("2*l", 1.0, 1.0).unwrap_err();
        assert!(matches!(err, FormulaError::UnsupportedToken { ref token, .. } if token == "*"));
        assert!(evaluate("h", 1.0, 1.0).is_err());
        assert!(evaluate("l;w", 1.0, 1.0).is_err());
    }

    #[test]
    fn rejects_malformed_sequences() {
        assert!(matches!(
            evaluate("l--w", 1.0, 1.0),
            Err(FormulaError::Malformed { .. })
        ));
        assert!(matches!(
            evaluate("2l+", 1.0, 1.0),
            Err(FormulaError::Malformed { .. })
        ));
        assert!(matches!(
            evaluate("lw", 1.0, 1.0),
            Err(FormulaError::Malformed { .. })
        ));
    }

    #[test]
    fn parses_full_formula() {
        let formula = Formula::parse("V;2l;1w;c3").unwrap();
        assert_eq!(formula.orient, BoxOrient::V);
        assert!(close(formula.x.l, 2.0));
        assert!(close(formula.y.w, 1.0));
        assert_eq!(formula.cluster.as_deref(), Some("c3"));
        assert_eq!(formula.origin(400.0, 300.0), Vec2::new(800.0, 300.0));
    }

    #[test]
    fn cluster_field_is_optional() {
        assert_eq!(Formula::parse("H;0;0;").unwrap().cluster, None);
        assert_eq!(Formula::parse("H;0;0").unwrap().cluster, None);
    }

    #[test]
    fn rejects_bad_formula_fields() {
        assert!(matches!(
            Formula::parse("X;0;0;"),
            Err(FormulaError::InvalidOrient(_))
        ));
        assert!(matches!(
            Formula::parse("H;0"),
            Err(FormulaError::MissingField { field: "y", .. })
        ));
        assert!(matches!(
            Formula::parse(""),
            Err(FormulaError::MissingField {
                field: "orientation",
                ..
            })
        ));
    }
}
