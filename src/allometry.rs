//! Allometric predictions from crown dimensions (Jucker et al. 2017 model form).
//!
//! Both predictions share `y = α · (H · CD)^β · exp(σ² / 2)`, where H is tree
//! height (m), CD crown diameter (m) and the last factor corrects the bias of
//! the log-log fit.

use crate::error::{CrownError, Result};

/// (α, β, σ) of one fitted table row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub name: &'static str,
    pub alpha: f64,
    pub beta: f64,
    pub sigma: f64,
}

const fn row(name: &'static str, alpha: f64, beta: f64, sigma: f64) -> Coefficients {
    Coefficients {
        name,
        alpha,
        beta,
        sigma,
    }
}

/// Highest biome code accepted by [`dbh`].
pub const MAX_BIOME_CODE: u32 = 24;

/// Stem diameter rows with published coefficients, indexed by biome code.
/// Codes past the end of the table (up to [`MAX_BIOME_CODE`]) are the
/// regional fits, which are not bundled.
pub const DBH_TABLE: [Coefficients; 1] = [row("global, angiosperm", 0.557, 0.809, 0.056)];

/// Above-ground biomass rows, indexed by species code - 1.
pub const AGB_TABLE: [Coefficients; 2] = [
    row("angiosperm", 0.016, 2.013, 0.204),
    row("gymnosperm", 0.109, 1.790, 0.236),
];

fn check_dimensions(height: f64, crown_diameter: f64) -> Result<()> {
    if !(height > 0.0 && height.is_finite()) || !(crown_diameter > 0.0 && crown_diameter.is_finite()) {
        return Err(CrownError::degenerate(format!(
            "height and crown diameter must be positive, got {height} and {crown_diameter}"
        )));
    }
    Ok(())
}

fn predict(c: &Coefficients, height: f64, crown_diameter: f64) -> f64 {
    c.alpha * (height * crown_diameter).powf(c.beta) * (c.sigma * c.sigma / 2.0).exp()
}

/// Diameter at breast height (cm) for a biome code in 0..=24.
pub fn dbh(height: f64, crown_diameter: f64, biome: u32) -> Result<f64> {
    if biome > MAX_BIOME_CODE {
        return Err(CrownError::config(format!(
            "invalid biome code {biome}, expected 0-{MAX_BIOME_CODE}"
        )));
    }
    let c = DBH_TABLE.get(biome as usize).ok_or_else(|| {
        CrownError::config(format!("no stem diameter coefficients bundled for biome code {biome}"))
    })?;
    check_dimensions(height, crown_diameter)?;
    Ok(predict(c, height, crown_diameter))
}

/// Above-ground biomass (kg); species 1 = angiosperm, 2 = gymnosperm.
pub fn agb(height: f64, crown_diameter: f64, species: u32) -> Result<f64> {
    let c = (species as usize)
        .checked_sub(1)
        .and_then(|i| AGB_TABLE.get(i))
        .ok_or_else(|| CrownError::config(format!("invalid species code {species}, expected 1-2")))?;
    check_dimensions(height, crown_diameter)?;
    Ok(predict(c, height, crown_diameter))
}
