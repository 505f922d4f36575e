//! Built-in cell templates for the notebook-building tools.

mod cds_forecast;
mod cds_historic;
mod spi_forecast;

pub use cds_forecast::cds_forecast_template;
pub use cds_historic::cds_historic_template;
pub use spi_forecast::spi_forecast_template;
