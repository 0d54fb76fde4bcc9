mod defaults;
mod deserialize;
mod resolve;
mod types;
mod util;

pub use self::defaults::parse_human_duration;
pub use self::resolve::{
    default_config_search_paths, load_and_resolve, minimal_config_template, parse_and_resolve,
    resolve_config_path, ConfigSource, EnvLookup, ResolvedConfig, CONFIG_ENV_VAR,
};
pub use self::types::*;
pub use self::util::expand_tilde;
