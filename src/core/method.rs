//! Valuation methods and per-method value containers

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Method {
    EvEbitda,
    PriceEarnings,
    PriceSales,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::EvEbitda, Method::PriceEarnings, Method::PriceSales];

    /// Configuration key used for this method in weight and bound tables.
    pub fn key(&self) -> &'static str {
        match self {
            Method::EvEbitda => "ev_ebitda",
            Method::PriceEarnings => "pe",
            Method::PriceSales => "ps",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Method::EvEbitda => "EV/EBITDA",
                Method::PriceEarnings => "P/E",
                Method::PriceSales => "P/S",
            }
        )
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ev_ebitda" | "ev/ebitda" => Ok(Method::EvEbitda),
            "pe" | "p/e" => Ok(Method::PriceEarnings),
            "ps" | "p/s" => Ok(Method::PriceSales),
            _ => Err(anyhow::anyhow!("Invalid valuation method: {}", s)),
        }
    }
}

/// One value per valuation method.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerMethod<T> {
    pub ev_ebitda: T,
    pub pe: T,
    pub ps: T,
}

impl<T> PerMethod<T> {
    pub fn new(ev_ebitda: T, pe: T, ps: T) -> Self {
        Self { ev_ebitda, pe, ps }
    }

    pub fn get(&self, method: Method) -> &T {
        match method {
            Method::EvEbitda => &self.ev_ebitda,
            Method::PriceEarnings => &self.pe,
            Method::PriceSales => &self.ps,
        }
    }

    pub fn get_mut(&mut self, method: Method) -> &mut T {
        match method {
            Method::EvEbitda => &mut self.ev_ebitda,
            Method::PriceEarnings => &mut self.pe,
            Method::PriceSales => &mut self.ps,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Method) -> T) -> Self {
        Self {
            ev_ebitda: f(Method::EvEbitda),
            pe: f(Method::PriceEarnings),
            ps: f(Method::PriceSales),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Method, &T) -> U) -> PerMethod<U> {
        PerMethod::from_fn(|m| f(m, self.get(m)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Method, &T)> {
        Method::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

/// Method weights as configured or after redistribution.
pub type MethodWeights = PerMethod<f64>;

/// Upper sanity bound for each multiple.
pub type OutlierBounds = PerMethod<f64>;

pub const DEFAULT_WEIGHTS: MethodWeights = PerMethod {
    ev_ebitda: 0.33,
    pe: 0.33,
    ps: 0.33,
};

pub const DEFAULT_OUTLIER_BOUNDS: OutlierBounds = PerMethod {
    ev_ebitda: 50.0,
    pe: 100.0,
    ps: 40.0,
};

impl MethodWeights {
    /// Returns the first weight that is negative, NaN or infinite.
    pub fn first_invalid(&self) -> Option<(Method, f64)> {
        self.iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
            .map(|(m, w)| (m, *w))
    }

    pub fn total(&self) -> f64 {
        self.ev_ebitda + self.pe + self.ps
    }
}
