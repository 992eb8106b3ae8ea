use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, info, warn};

use crate::error::NoCapturableDevice;

/// Sample rates probed against each candidate device, best first.
const CANDIDATE_RATES: [u32; 4] = [48_000, 32_000, 16_000, 8_000];

/// Substrings that mark a device as a system-audio loopback endpoint.
const LOOPBACK_MARKERS: [&str; 2] = ["loopback", "monitor of"];

/// Substrings that mark a device as a system audio-mix endpoint.
const MIX_MARKERS: [&str; 3] = ["stereo mix", "what u hear", "wave out mix"];

pub struct CpalDeviceInfo {
    pub name: String,
    pub device: cpal::Device,
}

/// A capture device that passed format probing, together with the format
/// the stream should be opened with.
pub struct ResolvedInput {
    pub device: cpal::Device,
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Enumerate input devices on the default host. Devices whose name
/// cannot be read are skipped.
pub fn list_input_devices() -> Result<Vec<CpalDeviceInfo>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    for device in host.input_devices()? {
        match device.name() {
            Ok(name) => devices.push(CpalDeviceInfo { name, device }),
            Err(e) => debug!("Skipping unnamed input device: {}", e),
        }
    }

    Ok(devices)
}

/// Pick a capturable audio source.
///
/// Candidates are ranked: an explicitly preferred device, loopback
/// endpoints, system-mix endpoints, then the default input (a physical
/// microphone, forced to mono). Each candidate is probed for 16-bit
/// support at the candidate rates; probe failures move on to the next
/// candidate rather than aborting.
pub fn resolve_input(preferred: Option<&str>) -> Result<ResolvedInput> {
    let devices = list_input_devices().unwrap_or_else(|e| {
        warn!("Failed to enumerate input devices: {}", e);
        Vec::new()
    });

    type Predicate = fn(&str) -> bool;
    let ranked: [(&str, Predicate); 2] = [
        ("loopback", |name| contains_any(name, &LOOPBACK_MARKERS)),
        ("system mix", |name| contains_any(name, &MIX_MARKERS)),
    ];

    if let Some(wanted) = preferred {
        for info in &devices {
            if info.name == wanted {
                if let Some(resolved) = probe_device(&info.device, &info.name, None) {
                    info!("Using preferred capture device '{}'", resolved.name);
                    return Ok(resolved);
                }
                warn!("Preferred device '{}' failed format probing", wanted);
            }
        }
    }

    for (tier, matches) in ranked {
        for info in &devices {
            if !matches(&info.name.to_lowercase()) {
                continue;
            }
            if let Some(resolved) = probe_device(&info.device, &info.name, None) {
                info!(
                    "Selected {} capture device '{}' ({} Hz, {} ch)",
                    tier, resolved.name, resolved.sample_rate, resolved.channels
                );
                return Ok(resolved);
            }
        }
    }

    // Last resort: the default microphone, mono.
    let host = cpal::default_host();
    if let Some(device) = host.default_input_device() {
        let name = device.name().unwrap_or_else(|_| "default".to_string());
        if let Some(resolved) = probe_device(&device, &name, Some(1)) {
            info!(
                "Falling back to default input '{}' ({} Hz, mono)",
                resolved.name, resolved.sample_rate
            );
            return Ok(resolved);
        }
    }

    Err(NoCapturableDevice.into())
}

fn contains_any(name: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| name.contains(marker))
}

/// Probe one device for a 16-bit config at the candidate rates. Returns
/// `None` when nothing matches; enumeration errors are non-fatal.
fn probe_device(
    device: &cpal::Device,
    name: &str,
    force_channels: Option<u16>,
) -> Option<ResolvedInput> {
    let configs: Vec<_> = match device.supported_input_configs() {
        Ok(configs) => configs.collect(),
        Err(e) => {
            debug!("Probing '{}' failed: {}", name, e);
            return None;
        }
    };

    for &rate in &CANDIDATE_RATES {
        for config in &configs {
            if config.sample_format() != cpal::SampleFormat::I16 {
                continue;
            }
            if rate < config.min_sample_rate().0 || rate > config.max_sample_rate().0 {
                continue;
            }
            let channels = force_channels
                .map(|c| c.min(config.channels()))
                .unwrap_or(config.channels());
            if channels == 0 {
                continue;
            }
            return Some(ResolvedInput {
                device: device.clone(),
                name: name.to_string(),
                sample_rate: rate,
                channels,
            });
        }
    }

    debug!("Device '{}' supports no candidate 16-bit format", name);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_matching_is_case_insensitive_after_lowering() {
        assert!(contains_any("monitor of built-in audio", &LOOPBACK_MARKERS));
        assert!(contains_any("stereo mix (realtek)", &MIX_MARKERS));
        assert!(!contains_any("usb microphone", &LOOPBACK_MARKERS));
        assert!(!contains_any("usb microphone", &MIX_MARKERS));
    }
}
