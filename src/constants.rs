/// Deepest tree the topology will enumerate.
pub const MAX_DEPTH: usize = 16;
/// Threshold at which a structural variable counts as selected.
pub const SELECTION_THRESHOLD: f64 = 0.5;
/// Distance from an integer below which a binary value counts as integral.
pub const INTEGRALITY_TOLERANCE: f64 = 1e-6;
/// Absolute gap under which a node cannot improve on the incumbent.
pub const GAP_TOLERANCE: f64 = 1e-6;
/// Amount by which a surrogate must exceed its true value before a cut is emitted.
pub const CUT_TOLERANCE: f64 = 1e-6;
/// Cut rounds allowed at a single fractional node.
pub const MAX_CUT_ROUNDS: usize = 8;
/// Default wall-clock limit of a fit, in seconds.
pub const DEFAULT_TIME_LIMIT: f64 = 60.0;
