//! Geodata tools for the naturalmaps agent.
//!
//! Tools give the agent its view of OpenStreetMap:
//! run Overpass QL queries and geocode places to get their area,
//! bounding box and common tag keys.

pub mod overpass_query;
pub mod place_info;

use naturalmaps_config::AppConfig;
use naturalmaps_core::tool::ToolRegistry;

pub use overpass_query::OverpassQueryTool;
pub use place_info::PlaceInfoTool;

/// Create the default tool registry from configuration.
///
/// Endpoints, timeouts and the Overpass result size limit come from the
/// `[overpass]` and `[nominatim]` sections.
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(OverpassQueryTool::new(&config.overpass)));
    registry.register(Box::new(PlaceInfoTool::new(&config.nominatim, &config.overpass)));
    registry
}
