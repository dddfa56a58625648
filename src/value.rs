//! The tagged value type every probe, expression, and emitted record is
//! built from.
//!
//! See `rb_value.c` in the original implementation: a `Value` is a number, a
//! string, or a vector of optional numbers with an optional reduction. A
//! vector's children are always scalar numbers — they are never
//! themselves vectors.

use tracing::error;

/// One measurement value, at any stage between a raw probe response and a
/// fully evaluated expression result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A plain number.
    Number(f64),
    /// An opaque byte string that did not fully parse as a number.
    String(Vec<u8>),
    /// A fixed-length sequence of optional scalar numbers, with an optional
    /// reduced scalar (`sum` or `mean` over the present children).
    Vector {
        children: Vec<Option<f64>>,
        reduction: Option<f64>,
    },
}

/// The reduction applied across the present children of a split vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    Mean,
}

impl Reduction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sum" => Some(Self::Sum),
            "mean" => Some(Self::Mean),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
        }
    }

    /// Reduce the present elements of `values`, or `None` if none are
    /// present.
    pub fn reduce(self, values: impl Iterator<Item = f64>) -> Option<f64> {
        let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            return None;
        }
        Some(match self {
            Self::Sum => sum,
            Self::Mean => sum / count as f64,
        })
    }
}

impl Value {
    /// Build a value from a raw byte string, auto-promoting to `Number`
    /// when the *entire* string parses as a finite double — mirrors
    /// `new_monitor_value_strn`'s `strtod` + `endptr` check.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        // `str::parse::<f64>` already requires the whole string to be
        // consumed, same as checking `endptr == &str[str_len]` against
        // `strtod`.
        if let Ok(text) = std::str::from_utf8(&bytes) {
            if let Ok(n) = text.parse::<f64>() {
                if n.is_finite() {
                    return Value::Number(n);
                }
            }
        }
        Value::String(bytes)
    }

    /// Build a vector value, splitting `raw` on every occurrence of
    /// `token`. An empty or unparseable element yields an absent slot.
    /// Child count is one plus the number of occurrences of `token` (a
    /// trailing separator yields a trailing empty slot).
    pub fn split(raw: &[u8], token: &str, reduction: Option<Reduction>) -> Self {
        let text = String::from_utf8_lossy(raw);
        let parts: Vec<&str> = if token.is_empty() {
            vec![text.as_ref()]
        } else {
            text.split(token).collect()
        };
        let children: Vec<Option<f64>> = parts
            .iter()
            .map(|p| {
                let p = p.trim();
                if p.is_empty() {
                    None
                } else {
                    p.parse::<f64>().ok().filter(|n| n.is_finite())
                }
            })
            .collect();
        let reduction = reduction.and_then(|r| r.reduce(children.iter().filter_map(|c| *c)));
        Value::Vector {
            children,
            reduction,
        }
    }

    /// Extract a numeric view of the value. `String`/`Vector` is a usage
    /// error: logged and reported as zero, never a panic (§4.A).
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::String(_) => {
                error!("tried to extract a number from a non-numeric string value");
                0.0
            }
            Value::Vector { .. } => {
                error!("tried to extract a number from a vector value");
                0.0
            }
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn as_vector(&self) -> Option<(&[Option<f64>], Option<f64>)> {
        match self {
            Value::Vector {
                children,
                reduction,
            } => Some((children.as_slice(), *reduction)),
            _ => None,
        }
    }
}
