//! Navigation hiérarchique de la carte

mod context;
mod navigator;

pub use context::{
    DepartmentRequest, NavigationContext, RefreshRequest, RegionRequest, Stale, Ticket,
};
pub use navigator::{Commit, NavigationSnapshot, Navigator, Outcome};
