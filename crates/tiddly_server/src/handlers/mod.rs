pub mod mirror;
pub mod status;
pub mod tiddlers;

pub use mirror::mirror_routes;
pub use status::status_routes;
pub use tiddlers::tiddler_routes;
