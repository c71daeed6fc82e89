/// Validation state of an archived block.
///
/// Monotone within a store epoch except via explicit rollback: a block only
/// moves forward through association and validation, and only the confirm
/// chaser's rollback path moves one back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockState {
    /// Header archived, no body.
    #[default]
    Unassociated,
    /// Body archived, not yet validated for confirmation.
    Associated,
    /// Full confirmation validation passed.
    Confirmable,
    /// Full confirmation validation failed; never confirmed.
    Unconfirmable,
}

impl BlockState {
    /// Returns true if a body is present.
    pub const fn has_body(&self) -> bool {
        !matches!(self, Self::Unassociated)
    }
}
