use crate::config::TargetConfig;
use crate::discovery::device_from_product;

/// How a run proceeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Look the device tree up on the target remote, add and sync it, then its dependencies
    Discover,
    /// Resolve dependencies of a device tree that is already in a manifest
    DependenciesOnly,
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub product: String,
    pub device: String,
    pub mode: Mode,
    pub target: TargetConfig,
}

impl Invocation {
    /// Build an invocation from the product and the remaining positional arguments.
    ///
    /// Any extra argument selects dependencies-only mode. `remote:<name>` and
    /// `branch:<name>` anywhere on the line override `defaults` and switch back
    /// to discovery.
    pub fn parse(product: &str, extra: &[String], defaults: &TargetConfig) -> Self {
        let mut target = defaults.clone();
        let mut mode = if extra.is_empty() {
            Mode::Discover
        } else {
            Mode::DependenciesOnly
        };

        for arg in std::iter::once(product).chain(extra.iter().map(String::as_str)) {
            if arg.contains("remote:") {
                if let Some((_, remote)) = arg.split_once(':') {
                    target.remote = remote.to_string();
                    mode = Mode::Discover;
                }
            } else if arg.contains("branch:") {
                if let Some((_, branch)) = arg.split_once(':') {
                    target.branch = branch.to_string();
                    mode = Mode::Discover;
                }
            }
        }

        Self {
            product: product.to_string(),
            device: device_from_product(product).to_string(),
            mode,
            target,
        }
    }
}
