/// Subprocess transport speaking newline-delimited JSON over stdin/stdout.
pub mod stdio;
