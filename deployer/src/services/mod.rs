pub mod approval;
pub mod deployment;
pub mod rollback;
