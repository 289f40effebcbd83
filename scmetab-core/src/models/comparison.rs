/// One arm of a design comparison: a subset name and its resolved cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonArm {
    pub subset: String,
    pub cells: Vec<String>,
}

/// A comparison job emitted by the design expander.
///
/// Jobs are emitted in configuration order and are independent of each
/// other: a failing job never aborts its siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonJob {
    pub design: String,
    pub arms: Vec<ComparisonArm>,
}

impl ComparisonJob {
    pub fn new(design: impl Into<String>, arms: Vec<ComparisonArm>) -> Self {
        ComparisonJob {
            design: design.into(),
            arms,
        }
    }
}
