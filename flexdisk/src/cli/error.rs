/// Error representation for the CLI: a message ready to show the user.
pub struct CliError(pub String);
