//! Device model: match filters, discovery, and the driver registry.

use crate::configurator::Configurator;
use crate::error::{Error, Result};
use crate::event::EventBus;
use crate::transport::HidTransport;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// USB vendor/product pair a driver matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceFilter {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Whether a discovered device matches this filter.
    pub fn matches(&self, info: &DeviceInfo) -> bool {
        info.vid == self.vendor_id && info.pid == self.product_id
    }
}

impl std::fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor_id, self.product_id)
    }
}

/// Information about one discovered HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vid: u16,
    pub pid: u16,
    pub path: String,
    pub serial: Option<String>,
    pub product: Option<String>,
    pub interface_number: i32,
    pub usage_page: u16,
}

impl DeviceInfo {
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter::new(self.vid, self.pid)
    }

    /// What ties this interface to the other interfaces of the same unit.
    pub fn physical_key(&self) -> PhysicalKey {
        if let Some(serial) = self.serial.as_deref().filter(|s| !s.is_empty()) {
            return PhysicalKey::Serial(serial.to_string());
        }
        usb_location(&self.path).map_or(PhysicalKey::Unknown, PhysicalKey::Location)
    }
}

/// Identity of one physical device across its HID interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalKey {
    /// USB serial number reported by the device.
    Serial(String),
    /// USB port location, shared by every interface of one device.
    Location(String),
    /// Nothing better known; such interfaces group by model alone.
    Unknown,
}

/// USB port location of a HID interface path.
///
/// libusb paths read `<bus>-<ports>:<config>.<interface>`. hidraw nodes
/// resolve through sysfs to `.../<bus>-<ports>/<interface dir>/<hid node>`.
fn usb_location(path: &str) -> Option<String> {
    if let Some((port, interface)) = path.split_once(':') {
        let libusb = port.contains('-') && interface.contains('.') && !path.starts_with('/');
        if libusb {
            return Some(port.to_string());
        }
    }

    let name = path.strip_prefix("/dev/")?;
    if !name.starts_with("hidraw") {
        return None;
    }
    let node = Path::new("/sys/class/hidraw").join(name).join("device");
    let hid_device = std::fs::canonicalize(node).ok()?;
    usb_device_dir(&hid_device).map(|dir| dir.to_string_lossy().into_owned())
}

/// The USB device directory above a sysfs HID node (node -> interface -> device).
fn usb_device_dir(hid_device: &Path) -> Option<&Path> {
    hid_device.parent()?.parent()
}

/// Builds a configurator from the manager's event bus and the matching handles.
pub type Constructor = fn(EventBus, Vec<Arc<dyn HidTransport>>) -> Result<Configurator>;

/// Static descriptor implemented by every concrete driver.
///
/// The filter is readable before any configurator exists, which lets an
/// orchestrator pick the driver for a discovered device.
pub trait ConfiguratorFactory {
    /// Human-readable model name.
    const NAME: &'static str;
    /// The one vendor/product pair this driver handles.
    const FILTER: DeviceFilter;

    /// Build a configurator from all interfaces of the matched device.
    fn construct(events: EventBus, transports: Vec<Arc<dyn HidTransport>>)
        -> Result<Configurator>;
}

/// Registry entry: match filter plus constructor.
#[derive(Debug, Clone, Copy)]
pub struct RegistryEntry {
    pub name: &'static str,
    pub filter: DeviceFilter,
    pub construct: Constructor,
}

impl RegistryEntry {
    pub fn of<F: ConfiguratorFactory>() -> Self {
        Self {
            name: F::NAME,
            filter: F::FILTER,
            construct: F::construct,
        }
    }
}

/// The set of drivers an orchestrator can instantiate.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        Self { entries }
    }

    /// Every driver shipped with this crate.
    pub fn builtin() -> Self {
        Self::new(crate::devices::builtin_entries())
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Driver for a discovered device, if any.
    pub fn find(&self, info: &DeviceInfo) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.filter.matches(info))
    }
}

/// Discover all connected devices some registered driver can handle.
///
/// Enumerates USB HID interfaces and returns one entry per interface.
pub fn discover_devices(registry: &Registry) -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let mut devices = Vec::new();
    for info in api.device_list() {
        let found = DeviceInfo {
            vid: info.vendor_id(),
            pid: info.product_id(),
            path: info.path().to_string_lossy().into_owned(),
            serial: info.serial_number().map(|s| s.to_string()),
            product: info.product_string().map(|s| s.to_string()),
            interface_number: info.interface_number(),
            usage_page: info.usage_page(),
        };

        if let Some(entry) = registry.find(&found) {
            info!(
                model = entry.name,
                vid = format_args!("0x{:04X}", found.vid),
                pid = format_args!("0x{:04X}", found.pid),
                interface = found.interface_number,
                path = %found.path,
                "Found supported device"
            );
            devices.push(found);
        }
    }

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}

/// Group interfaces by physical device, preserving discovery order.
///
/// Interfaces belong together when they share a model and a
/// [`PhysicalKey`], so two identical mice plugged in at once stay apart.
pub fn group_by_device(devices: Vec<DeviceInfo>) -> Vec<(DeviceFilter, Vec<DeviceInfo>)> {
    let mut groups: Vec<((DeviceFilter, PhysicalKey), Vec<DeviceInfo>)> = Vec::new();
    for info in devices {
        let key = (info.filter(), info.physical_key());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(info),
            None => groups.push((key, vec![info])),
        }
    }
    groups
        .into_iter()
        .map(|((filter, _), members)| (filter, members))
        .collect()
}

/// Pick the interface a driver talks to, falling back to the first handle.
pub fn select_transport(
    transports: Vec<Arc<dyn HidTransport>>,
    interface_number: i32,
) -> Result<Arc<dyn HidTransport>> {
    let index = transports
        .iter()
        .position(|t| t.info().interface_number == interface_number)
        .unwrap_or(0);
    transports
        .into_iter()
        .nth(index)
        .ok_or_else(|| Error::DeviceNotFound("no HID interface handed to driver".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{KanaV2, Rival310};
    use crate::transport::mock::MockTransport;

    fn info(vid: u16, pid: u16, interface_number: i32) -> DeviceInfo {
        DeviceInfo {
            vid,
            pid,
            path: format!("1-2:1.{interface_number}"),
            serial: None,
            product: None,
            interface_number,
            usage_page: 0,
        }
    }

    #[test]
    fn filter_matches_vid_and_pid() {
        let filter = DeviceFilter::new(0x1038, 0x1720);
        assert!(filter.matches(&info(0x1038, 0x1720, 0)));
        assert!(!filter.matches(&info(0x1038, 0x1721, 0)));
        assert!(!filter.matches(&info(0x046D, 0x1720, 0)));
    }

    #[test]
    fn filter_display() {
        assert_eq!(DeviceFilter::new(0x1038, 0x137A).to_string(), "1038:137A");
    }

    #[test]
    fn builtin_registry_finds_drivers() {
        let registry = Registry::builtin();
        let rival = registry.find(&info(0x1038, 0x1720, 0)).unwrap();
        assert_eq!(rival.name, Rival310::NAME);
        let kana = registry.find(&info(0x1038, 0x137A, 0)).unwrap();
        assert_eq!(kana.filter, KanaV2::FILTER);
        assert!(registry.find(&info(0x046D, 0xC08B, 0)).is_none());
    }

    #[test]
    fn builtin_filters_are_unique() {
        let registry = Registry::builtin();
        for (i, a) in registry.entries().iter().enumerate() {
            for b in &registry.entries()[i + 1..] {
                assert_ne!(a.filter, b.filter, "{} and {} share a filter", a.name, b.name);
            }
        }
    }

    #[test]
    fn group_by_device_keeps_order() {
        let groups = group_by_device(vec![
            info(0x1038, 0x1720, 0),
            info(0x1038, 0x137A, 0),
            info(0x1038, 0x1720, 1),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, DeviceFilter::new(0x1038, 0x1720));
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn identical_mice_on_different_ports_stay_apart() {
        let at = |path: &str| DeviceInfo {
            path: path.into(),
            ..info(0x1038, 0x1720, 0)
        };
        let groups = group_by_device(vec![
            at("1-2:1.0"),
            at("1-4.1:1.0"),
            at("1-2:1.1"),
            at("1-4.1:1.1"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1[0].path, "1-2:1.0");
        assert_eq!(groups[0].1[1].path, "1-2:1.1");
        assert_eq!(groups[1].1[0].path, "1-4.1:1.0");
        assert_eq!(groups[1].1[1].path, "1-4.1:1.1");
    }

    #[test]
    fn serial_number_identifies_the_device() {
        let with_serial = |serial: &str, interface_number| DeviceInfo {
            serial: Some(serial.into()),
            path: format!("mock:{serial}:{interface_number}"),
            ..info(0x1038, 0x1720, interface_number)
        };
        let groups = group_by_device(vec![
            with_serial("A1", 0),
            with_serial("B2", 0),
            with_serial("A1", 1),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(
            groups[0].1[0].physical_key(),
            PhysicalKey::Serial("A1".into())
        );
    }

    #[test]
    fn physical_key_from_path() {
        let with_path = |path: &str| DeviceInfo {
            path: path.into(),
            serial: Some(String::new()),
            ..info(0x1038, 0x1720, 0)
        };
        assert_eq!(
            with_path("3-1.2:1.2").physical_key(),
            PhysicalKey::Location("3-1.2".into())
        );
        assert_eq!(
            with_path("mock:1038:1720").physical_key(),
            PhysicalKey::Unknown
        );
        assert_eq!(with_path("/dev/input/event3").physical_key(), PhysicalKey::Unknown);
    }

    #[test]
    fn usb_device_dir_skips_interface_and_hid_node() {
        let node = Path::new("/sys/devices/pci0000:00/usb1/1-2/1-2:1.0/0003:1038:1720.0005");
        assert_eq!(
            usb_device_dir(node),
            Some(Path::new("/sys/devices/pci0000:00/usb1/1-2"))
        );
    }

    #[test]
    fn select_transport_prefers_interface() {
        let a: Arc<dyn HidTransport> =
            Arc::new(MockTransport::new(Rival310::FILTER).with_interface(1));
        let b: Arc<dyn HidTransport> =
            Arc::new(MockTransport::new(Rival310::FILTER).with_interface(0));
        let chosen = select_transport(vec![a, b], 0).unwrap();
        assert_eq!(chosen.info().interface_number, 0);
    }

    #[test]
    fn select_transport_falls_back_to_first() {
        let a: Arc<dyn HidTransport> =
            Arc::new(MockTransport::new(Rival310::FILTER).with_interface(2));
        let chosen = select_transport(vec![a], 0).unwrap();
        assert_eq!(chosen.info().interface_number, 2);
    }

    #[test]
    fn select_transport_rejects_empty() {
        assert!(matches!(
            select_transport(Vec::new(), 0),
            Err(Error::DeviceNotFound(_))
        ));
    }
}
