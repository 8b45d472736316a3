//! In-process host metrics via sysinfo.

use std::sync::Mutex;

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::probe::Probe;
use crate::sample::Sample;

struct HostState {
    system: System,
    disks: Disks,
    networks: Networks,
}

/// CPU, memory, disk, and network counters read without shelling out.
///
/// Metric groups are emitted best-effort: a group the platform cannot serve
/// (no root mount, no interfaces) is skipped without suppressing the rest.
pub struct SystemProbe {
    state: Mutex<HostState>,
}

impl std::fmt::Debug for SystemProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemProbe").finish()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        Self {
            state: Mutex::new(HostState {
                system: System::new_with_specifics(refresh),
                disks: Disks::new_with_refreshed_list(),
                networks: Networks::new_with_refreshed_list(),
            }),
        }
    }

    fn cpu_group(sample: &mut Sample, system: &System) {
        let cpus = system.cpus();
        if cpus.is_empty() {
            return;
        }
        sample.insert("cpu.usage", system.global_cpu_usage());
        sample.insert("cpu.count", cpus.len());
        sample.insert("cpu.freq_mhz", cpus[0].frequency());
    }

    fn load_group(sample: &mut Sample) {
        let load = System::load_average();
        sample.insert("cpu_load.load_1m", load.one);
        sample.insert("cpu_load.load_5m", load.five);
        sample.insert("cpu_load.load_15m", load.fifteen);
    }

    fn memory_group(sample: &mut Sample, system: &System) {
        sample.insert("virtual.total", system.total_memory());
        sample.insert("virtual.available", system.available_memory());
        sample.insert("virtual.used", system.used_memory());
        sample.insert("virtual.free", system.free_memory());
        sample.insert("swap.total", system.total_swap());
        sample.insert("swap.used", system.used_swap());
        sample.insert("swap.free", system.free_swap());
    }

    fn disk_group(sample: &mut Sample, disks: &Disks) {
        let Some(root) = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == std::path::Path::new("/"))
        else {
            return;
        };
        let total = root.total_space();
        let free = root.available_space();
        sample.insert("disk.total", total);
        sample.insert("disk.used", total.saturating_sub(free));
        sample.insert("disk.free", free);
    }

    fn net_group(sample: &mut Sample, networks: &Networks) {
        let mut bytes_recv = 0u64;
        let mut bytes_sent = 0u64;
        let mut pkts_recv = 0u64;
        let mut pkts_sent = 0u64;
        let mut errs_recv = 0u64;
        let mut errs_sent = 0u64;
        for (_name, data) in networks {
            bytes_recv += data.total_received();
            bytes_sent += data.total_transmitted();
            pkts_recv += data.total_packets_received();
            pkts_sent += data.total_packets_transmitted();
            errs_recv += data.total_errors_on_received();
            errs_sent += data.total_errors_on_transmitted();
        }
        sample.insert("net_io.bytes_recv", bytes_recv);
        sample.insert("net_io.bytes_sent", bytes_sent);
        sample.insert("net_io.packets_recv", pkts_recv);
        sample.insert("net_io.packets_sent", pkts_sent);
        sample.insert("net_io.errs_recv", errs_recv);
        sample.insert("net_io.errs_sent", errs_sent);
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for SystemProbe {
    fn describe(&self) -> String {
        "System".to_string()
    }

    fn tag(&self) -> &str {
        "system"
    }

    async fn read(&self) -> Option<Sample> {
        let mut state = self.state.lock().ok()?;
        state.system.refresh_cpu_usage();
        state.system.refresh_memory();
        state.disks.refresh(true);
        state.networks.refresh(true);

        let mut sample = Sample::new();
        Self::cpu_group(&mut sample, &state.system);
        Self::load_group(&mut sample);
        Self::memory_group(&mut sample, &state.system);
        Self::disk_group(&mut sample, &state.disks);
        Self::net_group(&mut sample, &state.networks);
        Some(sample)
    }
}
