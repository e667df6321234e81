//! 硬件聚合：队列 + 舵机控制器 + 传感器读取

use crate::config::HardwareConfig;
use crate::error::ControlError;
use crate::sensor::SensorReader;
use crate::servo::ServoController;
use bbplay_driver::CommandQueue;
use bbplay_pins::PinDriver;
use std::sync::Arc;
use tracing::info;

/// 一套完整的硬件访问栈
///
/// 按配置构建；丢弃时先停止舵机写入线程，再停止队列线程。
pub struct Hardware {
    config: HardwareConfig,
    servos: ServoController,
    sensors: SensorReader,
    queue: Arc<CommandQueue>,
}

impl Hardware {
    /// 启动队列和周期写入线程；配置了 `initial_position` 时下发初始位置
    pub fn start(config: HardwareConfig, driver: Arc<dyn PinDriver>) -> Result<Self, ControlError> {
        Self::build(config, driver, true)
    }

    /// 同 [`start`](Self::start)，但不启动周期写入线程
    pub fn start_without_writer(
        config: HardwareConfig,
        driver: Arc<dyn PinDriver>,
    ) -> Result<Self, ControlError> {
        Self::build(config, driver, false)
    }

    fn build(
        config: HardwareConfig,
        driver: Arc<dyn PinDriver>,
        with_writer: bool,
    ) -> Result<Self, ControlError> {
        config.validate()?;

        let queue = Arc::new(CommandQueue::new(driver.clone(), config.queue_config())?);
        let servos = if with_writer {
            ServoController::new(queue.clone(), &config)?
        } else {
            ServoController::without_writer(queue.clone(), &config)?
        };
        let sensors = SensorReader::new(driver, config.temperature_sensors.clone());

        if let Some(position) = config.servo.initial_position {
            // 模式设置命令的结果不等待，失败会在写入时再次暴露
            servos.init(position)?;
        }

        info!(
            "Hardware ready: {} servo(s), {} sensor(s), backend {}",
            servos.len(),
            sensors.len(),
            queue.driver().backend_name()
        );

        Ok(Self {
            config,
            servos,
            sensors,
            queue,
        })
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn servos(&self) -> &ServoController {
        &self.servos
    }

    pub fn sensors(&self) -> &SensorReader {
        &self.sensors
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }
}
