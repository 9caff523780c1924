use async_trait::async_trait;
use maxsmart_api::{CallOptions, Command, CommandError, DeviceState, Dispatcher, WattUnit};
use serde_json::Map;
use std::sync::Arc;

/// Where the polling loop reads device state from
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn read_state(&self) -> Result<DeviceState, CommandError>;
}

/// Reads state through a [`Dispatcher`], converting watts with a fixed unit
#[derive(Debug, Clone)]
pub struct DispatchStateSource {
    dispatcher: Arc<Dispatcher>,
    unit: WattUnit,
    options: CallOptions,
}

impl DispatchStateSource {
    pub fn new(dispatcher: Arc<Dispatcher>, unit: WattUnit) -> Self {
        Self {
            dispatcher,
            unit,
            options: CallOptions::default(),
        }
    }

    /// Override timeout and retries for poll reads
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn unit(&self) -> WattUnit {
        self.unit
    }
}

#[async_trait]
impl StateSource for DispatchStateSource {
    async fn read_state(&self) -> Result<DeviceState, CommandError> {
        let record = self
            .dispatcher
            .dispatch(Command::ReadState, Map::new(), self.options)
            .await?;
        DeviceState::from_record(&record, self.unit, self.dispatcher.ip())
    }
}
