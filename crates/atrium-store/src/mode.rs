/// Policy governing whether the target of a store may, must, or must not
/// already exist.
///
/// `MustNotExist` doubles as the platform's optimistic create-lock: two
/// concurrent creators of the same path cannot both succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreMode {
    /// Fail with `AlreadyExists` if the write root already has the file.
    MustNotExist,
    /// Fail with `NotFound` if the file exists in neither root.
    MustExist,
    /// Store unconditionally.
    Either,
}

impl std::fmt::Display for StoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::MustNotExist => "must-not-exist",
            Self::MustExist => "must-exist",
            Self::Either => "either",
        })
    }
}
