//! Linux sysfs 后端
//!
//! 通过 `/sys/class/pwm`、`/sys/bus/iio` 和 `/sys/class/gpio` 访问引脚。
//! 逻辑引脚名（如 `P9_14`）到 sysfs 通道的映射由 [`PinBinding`] 给出，
//! 不同内核版本的 pwmchip 编号不同，因此映射必须显式配置。

use crate::{PinBinding, PinDeviceError, PinDeviceErrorKind, PinDriver, PinError, PinId, PinMode};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// 默认 sysfs 挂载点
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// 12 位 ADC 满量程
pub const ADC_FULL_SCALE: f64 = 4095.0;

/// sysfs 引脚驱动
pub struct SysfsPinDriver {
    root: PathBuf,
    bindings: HashMap<PinId, PinBinding>,
    /// 已确认导出的引脚（避免每次写入都检查目录）
    exported: Mutex<HashSet<PinId>>,
}

impl SysfsPinDriver {
    pub fn new(bindings: HashMap<PinId, PinBinding>) -> Self {
        Self::with_root(DEFAULT_SYSFS_ROOT, bindings)
    }

    /// 使用自定义根目录（测试时指向临时目录）
    pub fn with_root(root: impl Into<PathBuf>, bindings: HashMap<PinId, PinBinding>) -> Self {
        Self {
            root: root.into(),
            bindings,
            exported: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn binding(&self, pin: &PinId) -> Result<PinBinding, PinError> {
        self.bindings
            .get(pin)
            .copied()
            .ok_or_else(|| PinError::UnknownPin(pin.clone()))
    }

    fn pwm_chip_dir(&self, chip: u32) -> PathBuf {
        self.root.join("class/pwm").join(format!("pwmchip{chip}"))
    }

    fn pwm_dir(&self, chip: u32, channel: u32) -> PathBuf {
        self.pwm_chip_dir(chip).join(format!("pwm{channel}"))
    }

    fn gpio_dir(&self, number: u32) -> PathBuf {
        self.root.join("class/gpio").join(format!("gpio{number}"))
    }

    fn adc_path(&self, device: u32, channel: u32) -> PathBuf {
        self.root
            .join("bus/iio/devices")
            .join(format!("iio:device{device}"))
            .join(format!("in_voltage{channel}_raw"))
    }

    /// 确保通道目录存在，必要时写入 `export`
    fn ensure_exported(
        &self,
        pin: &PinId,
        dir: &Path,
        export_file: &Path,
        index: u32,
    ) -> Result<(), PinError> {
        if self.exported.lock().contains(pin) {
            return Ok(());
        }
        if !dir.exists() {
            debug!("Exporting {} via {}", pin, export_file.display());
            write_attr(export_file, &index.to_string())?;
        }
        if !dir.exists() {
            return Err(PinError::Device(PinDeviceError::new(
                PinDeviceErrorKind::NotFound,
                format!("{} did not appear after export", dir.display()),
            )));
        }
        self.exported.lock().insert(pin.clone());
        Ok(())
    }

    fn ensure_pwm(&self, pin: &PinId, chip: u32, channel: u32) -> Result<PathBuf, PinError> {
        let dir = self.pwm_dir(chip, channel);
        let export = self.pwm_chip_dir(chip).join("export");
        self.ensure_exported(pin, &dir, &export, channel)?;
        Ok(dir)
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), PinError> {
    trace!("sysfs write {} <- {}", path.display(), value);
    fs::write(path, value).map_err(|e| map_io(path, e))
}

fn read_attr(path: &Path) -> Result<String, PinError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| map_io(path, e))
}

fn map_io(path: &Path, err: io::Error) -> PinError {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => PinDeviceErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => PinDeviceErrorKind::AccessDenied,
        io::ErrorKind::ResourceBusy => PinDeviceErrorKind::Busy,
        _ => return PinError::Io(err),
    };
    PinError::Device(PinDeviceError::new(
        kind,
        format!("{}: {}", path.display(), err),
    ))
}

impl PinDriver for SysfsPinDriver {
    fn set_mode(&self, pin: &PinId, mode: PinMode) -> Result<(), PinError> {
        match (self.binding(pin)?, mode) {
            (PinBinding::Gpio { number }, _) => {
                let dir = self.gpio_dir(number);
                let export = self.root.join("class/gpio/export");
                self.ensure_exported(pin, &dir, &export, number)?;
                let direction = match mode {
                    PinMode::Input => "in",
                    PinMode::Output => "out",
                };
                write_attr(&dir.join("direction"), direction)
            },
            (PinBinding::Pwm { chip, channel }, PinMode::Output) => {
                self.ensure_pwm(pin, chip, channel).map(|_| ())
            },
            (PinBinding::Adc { .. }, PinMode::Input) => Ok(()),
            (PinBinding::Pwm { .. }, PinMode::Input) | (PinBinding::Adc { .. }, PinMode::Output) => {
                Err(PinError::Unsupported {
                    pin: pin.clone(),
                    operation: "set_mode",
                })
            },
        }
    }

    fn write_analog(
        &self,
        pin: &PinId,
        duty_cycle: f64,
        frequency_hz: u32,
    ) -> Result<(), PinError> {
        crate::check_duty_cycle(pin, duty_cycle)?;
        if frequency_hz == 0 {
            return Err(PinError::InvalidValue {
                pin: pin.clone(),
                value: 0.0,
            });
        }

        let (chip, channel) = match self.binding(pin)? {
            PinBinding::Pwm { chip, channel } => (chip, channel),
            _ => {
                return Err(PinError::Unsupported {
                    pin: pin.clone(),
                    operation: "write_analog",
                });
            },
        };
        let dir = self.ensure_pwm(pin, chip, channel)?;

        let period_ns = 1_000_000_000u64 / u64::from(frequency_hz);
        let duty_ns = (duty_cycle * period_ns as f64).round() as u64;

        // 内核要求 duty_cycle <= period，修改周期前先清零占空比
        let current_period = read_attr(&dir.join("period")).ok();
        if current_period.as_deref() != Some(period_ns.to_string().as_str()) {
            write_attr(&dir.join("duty_cycle"), "0")?;
            write_attr(&dir.join("period"), &period_ns.to_string())?;
        }
        write_attr(&dir.join("duty_cycle"), &duty_ns.to_string())?;

        if read_attr(&dir.join("enable")).ok().as_deref() != Some("1") {
            write_attr(&dir.join("enable"), "1")?;
        }
        Ok(())
    }

    fn read_analog(&self, pin: &PinId) -> Result<f64, PinError> {
        let (device, channel) = match self.binding(pin)? {
            PinBinding::Adc { device, channel } => (device, channel),
            _ => {
                return Err(PinError::Unsupported {
                    pin: pin.clone(),
                    operation: "read_analog",
                });
            },
        };
        let raw = read_attr(&self.adc_path(device, channel))?;
        let value: u32 = raw.parse().map_err(|_| {
            PinError::Device(PinDeviceError::new(
                PinDeviceErrorKind::InvalidResponse,
                format!("unexpected ADC value '{raw}' on {pin}"),
            ))
        })?;
        Ok((f64::from(value) / ADC_FULL_SCALE).clamp(0.0, 1.0))
    }

    fn backend_name(&self) -> &'static str {
        "sysfs"
    }
}
