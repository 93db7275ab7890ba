use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    UnknownLoss(String),
    MalformedInteraction {
        spec: String,
        reason: &'static str,
    },
    LabelIndexOutOfBounds {
        index: u32,
        len: usize,
    },
    ResumeUnavailable,
    IncompatibleModel {
        what: &'static str,
        got: u64,
        expected: u64,
    },
    Unsupported(&'static str),
    Io(io::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
            ),
            MlErr::UnknownLoss(name) => write!(f, "Invalid loss function name: '{name}'"),
            MlErr::MalformedInteraction { spec, reason } => {
                write!(f, "Malformed interaction '{spec}': {reason}")
            }
            MlErr::LabelIndexOutOfBounds { index, len } => write!(
                f,
                "Label action {index} is not present, the label holds {len} entries"
            ),
            MlErr::ResumeUnavailable => f.write_str(
                "Resume requested but the model file was saved without resumable state",
            ),
            MlErr::IncompatibleModel {
                what,
                got,
                expected,
            } => write!(
                f,
                "Incompatible model file, {what} is {got} but this learner expects {expected}"
            ),
            MlErr::Unsupported(what) => write!(f, "Unsupported operation: {what}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
