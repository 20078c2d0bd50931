mod apply;
mod diff;
mod info;
mod init;
mod show;

pub use apply::*;
pub use diff::*;
pub use info::*;
pub use init::*;
pub use show::*;
