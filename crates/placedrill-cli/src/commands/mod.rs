pub mod init;
pub mod run;
pub mod simulate;
pub mod validate;
