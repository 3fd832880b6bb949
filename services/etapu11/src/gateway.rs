//! ETA PU 11 gateway
//!
//! Thin device layer over [`RegisterGateway`]: binds the register map and
//! adds the per-subsystem reads and typed views.

use errors::GatewayResult;
use gateway_core::{
    DataStatus, DataTable, FieldValue, ModbusSettings, ModbusTcpClient, RegisterGateway,
    RegisterTransport,
};
use tracing::info;

use crate::data::{BoilerData, EtaPU11Data, HeatingData, HotwaterData, StorageData, SystemData};
use crate::registers::{self, Subsystem};

/// Gateway for one ETA PU 11 controller
pub struct EtaPU11Gateway<T: RegisterTransport = ModbusTcpClient> {
    inner: RegisterGateway<T>,
}

impl EtaPU11Gateway<ModbusTcpClient> {
    /// Gateway talking Modbus/TCP with the given settings
    pub fn new(settings: ModbusSettings) -> GatewayResult<Self> {
        settings.validate()?;
        info!("ETAPU11 gateway for {}", settings.endpoint());
        Self::with_transport(ModbusTcpClient::new(settings))
    }
}

impl<T: RegisterTransport> EtaPU11Gateway<T> {
    pub fn with_transport(transport: T) -> GatewayResult<Self> {
        Ok(Self {
            inner: RegisterGateway::new(registers::registry()?, transport),
        })
    }

    pub async fn settings(&self) -> T::Settings {
        self.inner.settings().await
    }

    pub async fn update_settings(&self, settings: T::Settings) {
        self.inner.update_settings(settings).await;
    }

    pub fn is_startup_ok(&self) -> bool {
        self.inner.is_startup_ok()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    pub async fn read_all(&self) -> DataStatus {
        self.inner.read_all().await
    }

    pub async fn read_block(&self) -> DataStatus {
        self.inner.read_block().await
    }

    pub async fn read_property(&self, name: &str) -> DataStatus {
        self.inner.read_property(name).await
    }

    pub async fn read_properties<S: AsRef<str>>(&self, names: &[S]) -> DataStatus {
        self.inner.read_properties(names).await
    }

    pub async fn write_property(&self, name: &str, value: &str) -> DataStatus {
        self.inner.write_property(name, value).await
    }

    pub async fn startup(&self) -> bool {
        self.inner.startup().await
    }

    pub async fn check_access(&self) -> bool {
        self.inner.check_access().await
    }

    /// Read every readable field of one subsystem as a unit
    pub async fn read_subsystem(&self, subsystem: Subsystem) -> DataStatus {
        self.inner.read_group(subsystem.group()).await
    }

    pub async fn read_boiler_data(&self) -> DataStatus {
        self.read_subsystem(Subsystem::Boiler).await
    }

    pub async fn read_hotwater_data(&self) -> DataStatus {
        self.read_subsystem(Subsystem::Hotwater).await
    }

    pub async fn read_heating_data(&self) -> DataStatus {
        self.read_subsystem(Subsystem::Heating).await
    }

    pub async fn read_storage_data(&self) -> DataStatus {
        self.read_subsystem(Subsystem::Storage).await
    }

    pub async fn read_system_data(&self) -> DataStatus {
        self.read_subsystem(Subsystem::System).await
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn data(&self) -> EtaPU11Data {
        self.inner.with_data(EtaPU11Data::from_table)
    }

    pub fn boiler_data(&self) -> BoilerData {
        self.inner.with_data(BoilerData::from_table)
    }

    pub fn hotwater_data(&self) -> HotwaterData {
        self.inner.with_data(HotwaterData::from_table)
    }

    pub fn heating_data(&self) -> HeatingData {
        self.inner.with_data(HeatingData::from_table)
    }

    pub fn storage_data(&self) -> StorageData {
        self.inner.with_data(StorageData::from_table)
    }

    pub fn system_data(&self) -> SystemData {
        self.inner.with_data(SystemData::from_table)
    }

    /// Current value of one field
    pub fn value(&self, name: &str) -> Option<FieldValue> {
        self.inner.value(name)
    }

    /// Copy of the whole data table
    pub fn table(&self) -> DataTable {
        self.inner.data()
    }
}
