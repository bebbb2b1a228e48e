//! The embedded read-only resource system: environments register
//! themselves into a distributed slice before `main` runs (REDESIGN
//! FLAG "deferred registration via global static initialisers" — a
//! `linkme` distributed slice stands in for the source's global static
//! initializer list, replayed by [`ResourceManager`]'s constructor
//! exactly as the source's manager replays its deferred registrations).

use std::collections::HashMap;
use std::sync::OnceLock;

/// One named, read-only byte blob inside an [`Environment`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceEntry {
    pub path: &'static str,
    pub bytes: &'static [u8],
}

/// A named group of resources, addressed as `:/<name>/<entry.path>`.
#[derive(Debug, Clone, Copy)]
pub struct Environment {
    pub name: &'static str,
    pub entries: &'static [ResourceEntry],
}

/// The distributed slice every `Environment` registers itself into.
/// Populated before `main` runs; nothing but [`ResourceManager::global`]
/// should read it directly.
#[linkme::distributed_slice]
pub static ENVIRONMENTS: [Environment] = [..];

/// Process-wide, read-only, built once from [`ENVIRONMENTS`] on first
/// use (spec §9 "process-wide state with init-before-use ... exactly
/// one instance permitted").
pub struct ResourceManager {
    resources: HashMap<(&'static str, &'static str), &'static [u8]>,
}

impl ResourceManager {
    fn build() -> Self {
        let mut resources = HashMap::new();
        for env in ENVIRONMENTS.iter() {
            for entry in env.entries {
                if resources.insert((env.name, entry.path), entry.bytes).is_some() {
                    tracing::warn!(environment = env.name, path = entry.path, "duplicate resource registration, keeping the later one");
                }
            }
        }
        tracing::info!(environments = ENVIRONMENTS.len(), resources = resources.len(), "resource manager built");
        Self { resources }
    }

    pub fn global() -> &'static ResourceManager {
        static INSTANCE: OnceLock<ResourceManager> = OnceLock::new();
        INSTANCE.get_or_init(Self::build)
    }

    /// Looks up `:/<environment>/<path>`'s contiguous byte view.
    /// `full_path` must already have its leading `:/` stripped by the
    /// caller (see [`crate::file::File::open`]).
    pub fn lookup(&self, full_path: &str) -> Option<&'static [u8]> {
        let (environment, path) = full_path.split_once('/')?;
        self.resources.get(&(environment, path)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[linkme::distributed_slice(ENVIRONMENTS)]
    static TEST_ENV: Environment = Environment {
        name: "test-env",
        entries: &[ResourceEntry { path: "greeting.txt", bytes: b"hello" }],
    };

    #[test]
    fn registered_environment_is_replayed_into_the_manager() {
        let manager = ResourceManager::global();
        assert_eq!(manager.lookup("test-env/greeting.txt"), Some(&b"hello"[..]));
        assert_eq!(manager.lookup("test-env/missing.txt"), None);
        assert_eq!(manager.lookup("no-such-env/greeting.txt"), None);
    }
}
