pub mod answers;
pub mod callback;
pub mod check;
pub mod init;
pub mod render;
pub mod reset;
pub mod validate;
