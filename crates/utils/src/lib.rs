pub mod process;
pub mod shell;
pub mod text;
pub mod validate;
