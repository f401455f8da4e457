//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use strap_engine::testing::{RecordingObserver, ScriptedInstaller, ScriptedProbe};
use strap_engine::{Catalog, Engine, EngineBuilder};
use strap_state::MemoryResumeStore;
use strap_types::{Command, Package, PackageKind, TopLevelAction, Version};

pub fn package(id: &str) -> Package {
    Package::new(id, PackageKind::Msi).with_version(Version::new(1, 0, 0))
}

pub fn catalog(ids: &[&str]) -> Catalog {
    Catalog::new(ids.iter().map(|id| package(id)).collect()).unwrap()
}

/// Collaborators handed to one engine, kept so tests can inspect them
pub struct Fixture {
    pub probe: Arc<ScriptedProbe>,
    pub installer: Arc<ScriptedInstaller>,
    pub observer: Arc<RecordingObserver>,
    pub store: Arc<MemoryResumeStore>,
}

impl Fixture {
    pub fn new(probe: ScriptedProbe, installer: ScriptedInstaller, observer: RecordingObserver) -> Self {
        Self {
            probe: Arc::new(probe),
            installer: Arc::new(installer),
            observer: Arc::new(observer),
            store: Arc::new(MemoryResumeStore::new()),
        }
    }

    pub fn with_store(mut self, store: MemoryResumeStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn builder(&self, command: Command, catalog: Catalog) -> EngineBuilder {
        Engine::builder(command, catalog)
            .with_probe(self.probe.clone())
            .with_installer(self.installer.clone())
            .with_observer(self.observer.clone())
            .with_store(self.store.clone())
            .with_privileged(true)
    }

    pub fn engine(&self, action: TopLevelAction, catalog: Catalog) -> Engine {
        self.builder(Command::new(action), catalog).build().unwrap()
    }
}
