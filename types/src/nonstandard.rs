use core::fmt::{Display, Formatter, Result as FmtResult};

/// Like `Fork` in `consensus-specs`, but as a tag rather than a container.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Phase {
    Phase0,
}

impl Display for Phase {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        match self {
            Self::Phase0 => formatter.write_str("phase0"),
        }
    }
}
