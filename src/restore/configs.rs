// projectrestore/src/restore/configs.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;

use super::Restorer;
use super::eligibility::is_obsolete_component;
use super::manifest::{CONFIGURATIONS_MANIFEST, ComponentConfigurations, ConfigurationDocument};
use crate::platform::{ComponentDescriptor, Configuration, ConfigurationRow, PlatformApi};

/// Entities the platform creates empty and fills with a second call.
#[async_trait]
trait TwoStepEntity: Send + Sync {
    async fn create(&self, api: &dyn PlatformApi) -> crate::errors::Result<()>;
    async fn update(&self, api: &dyn PlatformApi) -> crate::errors::Result<()>;
}

#[async_trait]
impl TwoStepEntity for Configuration {
    async fn create(&self, api: &dyn PlatformApi) -> crate::errors::Result<()> {
        api.add_configuration(self).await
    }

    async fn update(&self, api: &dyn PlatformApi) -> crate::errors::Result<()> {
        api.update_configuration(self).await
    }
}

#[async_trait]
impl TwoStepEntity for ConfigurationRow {
    async fn create(&self, api: &dyn PlatformApi) -> crate::errors::Result<()> {
        api.add_configuration_row(self).await
    }

    async fn update(&self, api: &dyn PlatformApi) -> crate::errors::Result<()> {
        api.update_configuration_row(self).await
    }
}

/// Creates `shell`, then patches it to `full`. Not idempotent: a rerun
/// fails on the create step once the entity exists.
async fn two_step_create<E: TwoStepEntity>(api: &dyn PlatformApi, shell: &E, full: &E) -> crate::errors::Result<()> {
    shell.create(api).await?;
    full.update(api).await
}

fn configuration_pair(component_id: &str, configuration_id: &str, doc: &ConfigurationDocument) -> (Configuration, Configuration) {
    let shell = Configuration {
        component_id: component_id.to_string(),
        configuration_id: configuration_id.to_string(),
        name: doc.name.clone(),
        description: doc.description.clone(),
        change_description: None,
        configuration: None,
        state: None,
    };
    let full = Configuration {
        change_description: Some(format!("Configuration {} restored from backup", configuration_id)),
        configuration: Some(doc.configuration.clone()),
        state: doc.state.clone(),
        ..shell.clone()
    };
    (shell, full)
}

impl Restorer {
    /// Replays exported component configurations and their rows.
    pub async fn restore_configs(&self) -> Result<()> {
        info!("Downloading configurations");
        let components: Vec<ComponentConfigurations> = self.load_document(CONFIGURATIONS_MANIFEST).await?;

        let catalog: HashMap<String, ComponentDescriptor> = self
            .platform
            .list_components()
            .await
            .context("Failed to list components")?
            .into_iter()
            .map(|component| (component.id.clone(), component))
            .collect();

        for component in &components {
            let Some(descriptor) = catalog.get(&component.id) else {
                warn!("Skipping {} configurations - component does not exists", component.id);
                continue;
            };
            if is_obsolete_component(descriptor) {
                warn!("Skipping {} configurations - component has custom API", component.id);
                continue;
            }

            info!("Restoring {} configurations", component.id);
            for reference in &component.configurations {
                let relative = format!("configurations/{}/{}.json", component.id, reference.id);
                let doc: ConfigurationDocument = self.load_document(&relative).await?;

                let (shell, full) = configuration_pair(&component.id, &reference.id, &doc);
                two_step_create(self.platform.as_ref(), &shell, &full)
                    .await
                    .with_context(|| format!("Failed to restore configuration {}/{}", component.id, reference.id))?;

                for row in &doc.rows {
                    let row_shell = ConfigurationRow {
                        component_id: component.id.clone(),
                        configuration_id: reference.id.clone(),
                        row_id: row.id.clone(),
                        change_description: None,
                        configuration: None,
                        state: None,
                    };
                    let row_full = ConfigurationRow {
                        change_description: Some(format!("Row {} restored from backup", row.id)),
                        configuration: Some(row.configuration.clone()),
                        state: row.state.clone(),
                        ..row_shell.clone()
                    };
                    two_step_create(self.platform.as_ref(), &row_shell, &row_full)
                        .await
                        .with_context(|| {
                            format!("Failed to restore row {} of configuration {}/{}", row.id, component.id, reference.id)
                        })?;
                }
            }
        }
        Ok(())
    }
}
