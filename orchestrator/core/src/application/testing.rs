// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Programmable machines-platform double shared by the application
//! service tests.

use crate::domain::machine::{
    CreateMachineSpec, LogEntry, Machine, MachineConfig, MachineState, VolumeInfo,
};
use crate::domain::platform::{MachinePlatform, RemoteApiError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub struct MockPlatform {
    machine_state: Mutex<MachineState>,
    current_config: Mutex<MachineConfig>,
    fail_get_machine_remaining: AtomicU32,
    fail_create_volume: Mutex<Option<RemoteApiError>>,
    fail_delete_app_for: Mutex<HashSet<String>>,

    pub create_app_calls: AtomicU32,
    pub create_volume_calls: AtomicU32,
    pub create_machine_calls: AtomicU32,
    pub get_machine_calls: AtomicU32,
    pub update_machine_calls: AtomicU32,
    pub restart_machine_calls: AtomicU32,
    pub delete_app_calls: AtomicU32,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            machine_state: Mutex::new(MachineState::Starting),
            current_config: Mutex::new(MachineConfig::for_workload(
                "registry.example.com/guild-bot:v1",
                Vec::new(),
                "vol-1",
            )),
            fail_get_machine_remaining: AtomicU32::new(0),
            fail_create_volume: Mutex::new(None),
            fail_delete_app_for: Mutex::new(HashSet::new()),
            create_app_calls: AtomicU32::new(0),
            create_volume_calls: AtomicU32::new(0),
            create_machine_calls: AtomicU32::new(0),
            get_machine_calls: AtomicU32::new(0),
            update_machine_calls: AtomicU32::new(0),
            restart_machine_calls: AtomicU32::new(0),
            delete_app_calls: AtomicU32::new(0),
        }
    }
}

impl MockPlatform {
    pub fn set_machine_state(&self, state: MachineState) {
        *self.machine_state.lock().unwrap() = state;
    }

    pub fn set_current_config(&self, config: MachineConfig) {
        *self.current_config.lock().unwrap() = config;
    }

    pub fn current_config(&self) -> MachineConfig {
        self.current_config.lock().unwrap().clone()
    }

    /// The next `n` `get_machine` calls fail with a transport error.
    pub fn fail_get_machine_times(&self, n: u32) {
        self.fail_get_machine_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_create_volume_with(&self, err: RemoteApiError) {
        *self.fail_create_volume.lock().unwrap() = Some(err);
    }

    pub fn fail_delete_app(&self, app: &str) {
        self.fail_delete_app_for
            .lock()
            .unwrap()
            .insert(app.to_string());
    }

    /// Total calls issued against the platform, all endpoints.
    pub fn total_calls(&self) -> u32 {
        self.create_app_calls.load(Ordering::SeqCst)
            + self.create_volume_calls.load(Ordering::SeqCst)
            + self.create_machine_calls.load(Ordering::SeqCst)
            + self.get_machine_calls.load(Ordering::SeqCst)
            + self.update_machine_calls.load(Ordering::SeqCst)
            + self.restart_machine_calls.load(Ordering::SeqCst)
            + self.delete_app_calls.load(Ordering::SeqCst)
    }

    fn machine(&self, id: &str) -> Machine {
        Machine {
            id: id.to_string(),
            name: None,
            state: *self.machine_state.lock().unwrap(),
            region: Some("iad".to_string()),
            config: self.current_config(),
        }
    }
}

#[async_trait]
impl MachinePlatform for MockPlatform {
    async fn create_app(&self, _name: &str) -> Result<(), RemoteApiError> {
        self.create_app_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_volume(
        &self,
        _app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<VolumeInfo, RemoteApiError> {
        self.create_volume_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_create_volume.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(VolumeInfo {
            id: "vol-1".to_string(),
            name: Some(name.to_string()),
            region: Some(region.to_string()),
            size_gb: Some(size_gb),
        })
    }

    async fn create_machine(
        &self,
        _app: &str,
        spec: &CreateMachineSpec,
        region: &str,
    ) -> Result<Machine, RemoteApiError> {
        self.create_machine_calls.fetch_add(1, Ordering::SeqCst);
        *self.current_config.lock().unwrap() = spec.config.clone();
        Ok(Machine {
            id: "m-1".to_string(),
            name: Some(spec.name.clone()),
            state: MachineState::Created,
            region: Some(region.to_string()),
            config: spec.config.clone(),
        })
    }

    async fn get_machine(&self, _app: &str, id: &str) -> Result<Machine, RemoteApiError> {
        self.get_machine_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_get_machine_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_get_machine_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(RemoteApiError::transport("connection reset"));
        }
        Ok(self.machine(id))
    }

    async fn update_machine(
        &self,
        _app: &str,
        _id: &str,
        config: &MachineConfig,
    ) -> Result<(), RemoteApiError> {
        self.update_machine_calls.fetch_add(1, Ordering::SeqCst);
        *self.current_config.lock().unwrap() = config.clone();
        Ok(())
    }

    async fn restart_machine(&self, _app: &str, _id: &str) -> Result<(), RemoteApiError> {
        self.restart_machine_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_app(&self, app: &str) -> Result<(), RemoteApiError> {
        self.delete_app_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete_app_for.lock().unwrap().contains(app) {
            return Err(RemoteApiError {
                status: 500,
                message: format!("app {} deletion failed", app),
            });
        }
        Ok(())
    }

    async fn machine_logs(&self, _app: &str, _id: &str) -> Result<Vec<LogEntry>, RemoteApiError> {
        Ok(vec![LogEntry {
            timestamp: None,
            message: "workload online".to_string(),
            level: Some("info".to_string()),
        }])
    }
}
