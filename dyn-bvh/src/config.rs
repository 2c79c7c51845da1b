use log::error;
use serde::{Deserialize, Serialize};

use crate::spatial::TreeOptions;
use crate::{Error, Result};

/// A simulation scenario for exercising a tree with moving spheres.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// The name of the scenario, used for reporting.
    #[serde(default)]
    pub name: String,

    /// The number of spheres.
    pub num_objects: usize,

    /// The number of simulated ticks.
    pub num_ticks: usize,

    /// The edge length of the cube centered at the origin the spheres are spawned in.
    #[serde(default = "default_world_size")]
    pub world_size: f32,

    /// The smallest sphere radius.
    pub min_radius: f32,

    /// The largest sphere radius.
    pub max_radius: f32,

    /// The largest per axis movement of a sphere per tick.
    pub max_step: f32,

    /// The fraction of spheres moved per tick, between 0 and 1.
    pub moved_fraction: f32,

    /// The number of box and ray queries per tick.
    #[serde(default)]
    pub queries_per_tick: usize,

    /// How moved spheres are reported to the tree.
    #[serde(default)]
    pub movement: MovementMode,

    /// The seed for spawning and moving the spheres.
    #[serde(default)]
    pub seed: u64,

    /// The options of the tree under test.
    #[serde(default)]
    pub tree: TreeOptions,
}

/// How a moved object is reported to the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum MovementMode {
    /// Full refit of the owning leaf.
    #[default]
    Refit,

    /// Conservative expansion of the owning leaf.
    Expand,
}

fn default_world_size() -> f32 {
    100.0
}

impl SimulationConfig {
    /// Reads the configuration from the provided reader.
    ///
    /// # Arguments
    /// * `reader` - The reader to read the configuration from.
    pub fn read<R: std::io::Read>(reader: R) -> Result<Self> {
        let config: SimulationConfig = serde_yaml::from_reader(reader).map_err(|e| {
            error!("Failed to parse the configuration: {:?}", e);

            Error::DeserializationError(Box::new(e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Writes the configuration to the provided writer.
    ///
    /// # Arguments
    /// * `writer` - The writer to write the configuration to.
    pub fn write<W: std::io::Write>(&self, mut writer: W) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).map_err(|e| {
            error!("Failed to serialize the configuration: {:?}", e);

            Error::SerializationError(Box::new(e))
        })?;

        writer.write_all(yaml.as_bytes())?;

        Ok(())
    }

    /// Checks the value ranges of the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.world_size > 0f32) {
            return Err(Error::InvalidConfig(format!(
                "world size must be positive, got {}",
                self.world_size
            )));
        }

        if !(self.min_radius > 0f32 && self.min_radius <= self.max_radius) {
            return Err(Error::InvalidConfig(format!(
                "invalid radius range {}..{}",
                self.min_radius, self.max_radius
            )));
        }

        if !(self.max_step >= 0f32) {
            return Err(Error::InvalidConfig(format!(
                "max step must not be negative, got {}",
                self.max_step
            )));
        }

        if !(0f32..=1f32).contains(&self.moved_fraction) {
            return Err(Error::InvalidConfig(format!(
                "moved fraction must lie in [0, 1], got {}",
                self.moved_fraction
            )));
        }

        if self.tree.leaf_capacity == 0 {
            return Err(Error::InvalidLeafCapacity(0));
        }

        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            num_objects: 1000,
            num_ticks: 100,
            world_size: default_world_size(),
            min_radius: 0.1,
            max_radius: 1.0,
            max_step: 0.5,
            moved_fraction: 0.1,
            queries_per_tick: 10,
            movement: MovementMode::default(),
            seed: 0,
            tree: TreeOptions::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_loading_config() {
        let simple_config_data = include_bytes!("../../scenarios/simple.yaml");
        let config = SimulationConfig::read(&simple_config_data[..]).unwrap();

        assert_eq!(config.name, "simple");
        assert_eq!(config.num_objects, 1000);
        assert_eq!(config.num_ticks, 20);
        assert_eq!(config.world_size, 100.0);
        assert_eq!(config.movement, MovementMode::Refit);
        assert_eq!(config.queries_per_tick, 10);
        assert_eq!(config.seed, 7);
        assert_eq!(config.tree.leaf_capacity, 1);
    }

    #[test]
    fn test_defaults_of_optional_fields() {
        let yaml = "
num_objects: 10
num_ticks: 2
min_radius: 0.5
max_radius: 0.5
max_step: 1.0
moved_fraction: 0.5
";
        let config = SimulationConfig::read(yaml.as_bytes()).unwrap();

        assert_eq!(config.name, "");
        assert_eq!(config.world_size, 100.0);
        assert_eq!(config.queries_per_tick, 0);
        assert_eq!(config.movement, MovementMode::Refit);
        assert_eq!(config.tree, TreeOptions::default());
    }

    #[test]
    fn test_write_and_read_back() {
        let config = SimulationConfig {
            name: "expand".to_string(),
            movement: MovementMode::Expand,
            seed: 12,
            ..Default::default()
        };

        let mut buffer = Vec::new();
        config.write(&mut buffer).unwrap();
        let config2 = SimulationConfig::read(&buffer[..]).unwrap();

        assert_eq!(config, config2);
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let config = SimulationConfig {
            min_radius: 2.0,
            max_radius: 1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SimulationConfig {
            moved_fraction: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        assert!(SimulationConfig::read("num_objects: [1, 2]".as_bytes()).is_err());
    }
}
