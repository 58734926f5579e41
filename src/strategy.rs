use std::{fmt, str::FromStr};

use crate::block::Handle;

/// Placement policy used to pick a free block for a request.
///
/// All three scan the whole chain in order; ties always go to the block
/// found first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// First free block that is large enough.
    #[default]
    FirstFit,
    /// Free block with the least slack (`size - requested`).
    BestFit,
    /// Free block with the most slack.
    WorstFit,
}

impl Strategy {
    pub const ALL: [Self; 3] = [Self::FirstFit, Self::BestFit, Self::WorstFit];

    /// Picks one of the `candidates` (free blocks, in chain order, with their
    /// payload size) for a request of `requested` bytes.
    pub(crate) fn select<I>(self, requested: usize, candidates: I) -> Option<Handle>
    where
        I: IntoIterator<Item = (Handle, usize)>,
    {
        let mut eligible = candidates
            .into_iter()
            .filter(|&(_, size)| size >= requested)
            .map(|(handle, size)| (handle, size - requested));

        let chosen = match self {
            Self::FirstFit => eligible.next(),
            Self::BestFit => eligible.fold(None, |best, (handle, slack)| match best {
                Some((_, least)) if least <= slack => best,
                _ => Some((handle, slack)),
            }),
            Self::WorstFit => eligible.fold(None, |worst, (handle, slack)| match worst {
                Some((_, most)) if most >= slack => worst,
                _ => Some((handle, slack)),
            }),
        };

        chosen.map(|(handle, _)| handle)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FirstFit => "first-fit",
            Self::BestFit => "best-fit",
            Self::WorstFit => "worst-fit",
        })
    }
}

/// Returned when a string names no known [`Strategy`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown placement strategy `{0}`")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-fit" | "first" => Ok(Self::FirstFit),
            "best-fit" | "best" => Ok(Self::BestFit),
            "worst-fit" | "worst" => Ok(Self::WorstFit),
            other => Err(UnknownStrategy(other.to_owned())),
        }
    }
}
