pub mod bird;
pub mod defillama;
pub mod github;
pub mod post_parser;

pub use bird::BirdCli;
pub use defillama::{ChainTvlPoint, DefiLlamaClient, ProtocolDetail, ProtocolSummary};
pub use github::{created_since_query, pushed_since_query, GithubClient, Repository, SearchSort};
pub use post_parser::{BirdTextV1, PostParser, PostedAt, RawPost};

pub use narrative_common::FetchError;

pub type Result<T> = std::result::Result<T, FetchError>;
