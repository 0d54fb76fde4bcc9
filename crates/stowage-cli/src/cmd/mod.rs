pub(crate) mod daemon;
pub(crate) mod list;
pub(crate) mod run;

/// `Ok(false)` means the command ran but reports failure (exit status 1).
pub(crate) type CmdResult = Result<bool, Box<dyn std::error::Error>>;
