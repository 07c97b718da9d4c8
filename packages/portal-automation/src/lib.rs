//! Automation capability for the citizen FIR portal.
//!
//! The portal is a legacy postback-style ASP.NET site driven through a
//! headless browser. This crate defines the capability surface the crawl
//! engine depends on — stateless per-call operations against one live
//! session — plus an HTTP bridge implementation that forwards each call to
//! a local browser-driver sidecar. DOM selectors, export-menu mechanics and
//! other page details live entirely in the sidecar.

pub mod bridge;
pub mod error;
pub mod session;
pub mod types;

pub use bridge::HttpDriver;
pub use error::AutomationError;
pub use session::{PortalDriver, PortalSession};
pub use types::{portal_date, DiscoveredFir, SelectOption};
