mod fetcher;
mod source;

pub use fetcher::{parse_map_list, AssetFetcher, FetchReport, MapName, FETCH_WORKERS};
pub use source::{AssetSource, FetchError, HttpSource};
