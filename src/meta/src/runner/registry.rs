// Copyright 2026 The Feature Platform Coordinator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The runner factory registry (C3, §4.3): a process-wide, read-only-after-
//! startup dispatch table from runner name to a factory that builds a
//! [`Runner`] from its serialized config. This is the only global state in
//! the crate (§9).

use std::collections::HashMap;
use std::sync::Arc;

use fpcoord_common::{Error, Result};
use parking_lot::RwLock;

use super::Runner;

pub type RunnerFactory = Arc<dyn Fn(&[u8]) -> Result<Box<dyn Runner>> + Send + Sync>;

#[derive(Default)]
pub struct RunnerRegistry {
    factories: RwLock<HashMap<&'static str, RunnerFactory>>,
}

impl RunnerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, name: &'static str, factory: RunnerFactory) -> Result<()> {
        let mut factories = self.factories.write();
        if factories.contains_key(name) {
            return Err(Error::DuplicateRunner(name.to_string()));
        }
        factories.insert(name, factory);
        Ok(())
    }

    pub fn create(&self, name: &str, config: &[u8]) -> Result<Box<dyn Runner>> {
        let factories = self.factories.read();
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::UnknownRunner(name.to_string()))?;
        factory(config)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::watcher::{SyncWatcher, WatcherRef};

    struct NoopRunner;

    #[async_trait]
    impl Runner for NoopRunner {
        fn name(&self) -> &'static str {
            "NOOP"
        }

        async fn run(self: Box<Self>) -> WatcherRef {
            let (watcher, done) = SyncWatcher::new();
            done.finish(Ok(()));
            watcher
        }
    }

    #[test]
    fn duplicate_registration_errors() {
        let registry = RunnerRegistry::new();
        let factory: RunnerFactory = Arc::new(|_| Ok(Box::new(NoopRunner) as Box<dyn Runner>));
        registry.register("NOOP", factory.clone()).unwrap();
        let err = registry.register("NOOP", factory).unwrap_err();
        assert!(matches!(err, Error::DuplicateRunner(name) if name == "NOOP"));
    }

    #[test]
    fn unknown_runner_errors_before_any_side_effect() {
        let registry = RunnerRegistry::new();
        let err = match registry.create("ghost_job", b"{}") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, Error::UnknownRunner(name) if name == "ghost_job"));
    }

    #[test]
    fn registered_runner_is_constructible() {
        let registry = RunnerRegistry::new();
        registry
            .register("NOOP", Arc::new(|_| Ok(Box::new(NoopRunner) as Box<dyn Runner>)))
            .unwrap();
        assert!(registry.create("NOOP", b"{}").is_ok());
    }
}
