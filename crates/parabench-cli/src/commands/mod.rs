//! Commands - CLI Command Implementations
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

pub mod init;
pub mod train;
pub mod utils;
pub mod volume;
