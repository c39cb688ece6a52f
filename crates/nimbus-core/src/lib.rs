//! Nimbus core
//!
//! Resource descriptor model, topology construction and the KDL
//! configuration parser.
//!
//! ```kdl
//! project "demo"
//! region "eastus"
//!
//! vm {
//!     size "Standard_DS1_v2"
//!     ssh-public-key "~/.ssh/id_ed25519.pub"
//! }
//!
//! security-rule "allow-ssh" {
//!     priority 1000
//!     port 22
//! }
//! ```

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;

pub use error::{Result, TopologyError};
pub use loader::{
    apply_env_overrides, expand_home, load_settings, load_topology, load_topology_without_key,
    read_ssh_public_key,
};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
