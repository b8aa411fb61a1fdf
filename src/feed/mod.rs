mod fetch;
mod parse;

pub use fetch::{is_url, load_feed};
pub use parse::{Episode, Feed, Podcast, parse_feed};
