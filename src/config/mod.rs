mod schema;

pub use schema::{
    AutosaveConfig, AutosaveSettings, ClockConfig, Config, HousekeepingConfig, Profile,
};
