// Driver package / 驱动包
pub mod smb;

use std::sync::Arc;

use crate::storage::StorageManager;
use smb::client::SmbConnector;

/// Register all drivers to StorageManager / 注册所有驱动
pub async fn register_all(manager: &StorageManager, connector: Arc<dyn SmbConnector>) -> anyhow::Result<()> {
    // Register SMB/CIFS driver / 注册SMB网络共享驱动
    manager.register_factory(Box::new(smb::SmbDriverFactory::new(connector))).await?;
    Ok(())
}
