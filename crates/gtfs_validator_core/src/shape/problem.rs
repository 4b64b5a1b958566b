use super::Match;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    StopTooFarFromShape,
    StopsMatchOutOfOrder,
    StopHasTooManyMatches,
}

/// A visit that does not fit the shape. Stops are indices into the
/// `StopPoints` the problem was found for.
#[derive(Debug, Clone, PartialEq)]
pub enum Problem {
    StopTooFarFromShape {
        stop: usize,
        matched: Match,
    },
    StopsMatchOutOfOrder {
        stop: usize,
        matched: Match,
        prev_stop: usize,
        prev_match: Match,
    },
    StopHasTooManyMatches {
        stop: usize,
        matched: Match,
        match_count: usize,
    },
}

impl Problem {
    pub fn kind(&self) -> ProblemKind {
        match self {
            Problem::StopTooFarFromShape { .. } => ProblemKind::StopTooFarFromShape,
            Problem::StopsMatchOutOfOrder { .. } => ProblemKind::StopsMatchOutOfOrder,
            Problem::StopHasTooManyMatches { .. } => ProblemKind::StopHasTooManyMatches,
        }
    }

    pub fn stop(&self) -> usize {
        match self {
            Problem::StopTooFarFromShape { stop, .. }
            | Problem::StopsMatchOutOfOrder { stop, .. }
            | Problem::StopHasTooManyMatches { stop, .. } => *stop,
        }
    }

    pub fn matched(&self) -> &Match {
        match self {
            Problem::StopTooFarFromShape { matched, .. }
            | Problem::StopsMatchOutOfOrder { matched, .. }
            | Problem::StopHasTooManyMatches { matched, .. } => matched,
        }
    }
}
