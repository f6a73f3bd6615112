mod apply;
mod destroy;
mod graph;
mod init;
mod outputs;
mod plan;
mod status;

pub use apply::cmd_apply;
pub use destroy::cmd_destroy;
pub use graph::cmd_graph;
pub use init::cmd_init;
pub use outputs::cmd_outputs;
pub use plan::cmd_plan;
pub use status::cmd_status;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use sitestack_lib::execute::ApplyOptions;
use sitestack_lib::provider::{LocalProvider, ProviderConfig};

use crate::output::OutputFormat;

/// Global flags shared by every command.
pub struct StackContext {
  pub stack: String,
  pub region: String,
  pub format: OutputFormat,
}

impl StackContext {
  pub fn apply_options(&self) -> ApplyOptions {
    ApplyOptions {
      stack: self.stack.clone(),
      region: self.region.clone(),
      ..Default::default()
    }
  }

  pub fn provider(&self) -> LocalProvider {
    LocalProvider::new(ProviderConfig::default().with_region(&self.region))
  }
}

fn runtime() -> Result<Runtime> {
  Runtime::new().context("Failed to create async runtime")
}
