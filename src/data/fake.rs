/*!
Generate fake closing price data, for demos and testing purposes
*/
use super::Observation;
use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};

/// A trait implemented by price generators
pub trait PriceGen {
    /// Generate a price, jumping forward a given amount of time
    fn price_after(&mut self, after: Duration) -> f64;
}

/// Generate fake prices using a time-weighted geometric random walk
#[derive(Debug, Clone)]
pub struct PriceRandomWalk<R> {
    /// The RNG used by this random walk
    pub rng: R,
    /// The current price
    pub price: f64,
    /// The mean daily log return
    pub drift: f64,
    /// The distribution of daily log returns
    pub returns: Normal<f64>,
}

impl<R: Rng> PriceRandomWalk<R> {
    /// Start a random walk at `price`, with daily log returns of mean `drift` and standard deviation `volatility`
    pub fn new(rng: R, price: f64, drift: f64, volatility: f64) -> Result<PriceRandomWalk<R>, NormalError> {
        Ok(PriceRandomWalk {
            rng,
            price,
            drift,
            returns: Normal::new(drift, volatility)?,
        })
    }
}

impl<R: Rng> PriceGen for PriceRandomWalk<R> {
    fn price_after(&mut self, after: Duration) -> f64 {
        let days = after.num_seconds() as f64 / 86_400.0;
        if days <= 0.0 {
            return self.price;
        }
        // Scale a daily return to the elapsed time: mean by `days`, deviation by its square root
        let z = self.returns.sample(&mut self.rng);
        let log_return = self.drift * days + (z - self.drift) * days.sqrt();
        self.price *= log_return.exp();
        self.price
    }
}

/// Generate a series of observations, one per period, using a price generator
#[derive(Debug, Clone)]
pub struct SeriesGen<P: PriceGen> {
    /// The timestamp of the next observation
    pub t: NaiveDateTime,
    /// The time between observations
    pub period: Duration,
    /// The price generator in use
    pub price_gen: P,
}

impl<P: PriceGen> SeriesGen<P> {
    /// Generate daily observations starting at `start`
    pub fn daily(start: NaiveDateTime, price_gen: P) -> SeriesGen<P> {
        SeriesGen {
            t: start,
            period: Duration::days(1),
            price_gen,
        }
    }
}

impl<P: PriceGen> Iterator for SeriesGen<P> {
    type Item = Observation;
    fn next(&mut self) -> Option<Observation> {
        let c = self.price_gen.price_after(self.period);
        let obs = Observation { t: self.t, c };
        self.t = self.t + self.period;
        Some(obs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ObservationSeries;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 10, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn walk(seed: u64) -> PriceRandomWalk<StdRng> {
        PriceRandomWalk::new(StdRng::seed_from_u64(seed), 40.0, 0.0005, 0.02).unwrap()
    }

    #[test]
    fn generated_series_is_valid() {
        let observations: Vec<_> = SeriesGen::daily(start(), walk(7)).take(200).collect();
        assert!(observations.iter().all(|o| o.c.is_finite() && o.c > 0.0));
        let series = ObservationSeries::new(observations).unwrap();
        assert_eq!(series.len(), 200);
        assert_eq!(
            series.last().unwrap().t,
            start() + Duration::days(199)
        );
    }

    #[test]
    fn seeded_walks_repeat() {
        let a: Vec<_> = SeriesGen::daily(start(), walk(42)).take(50).collect();
        let b: Vec<_> = SeriesGen::daily(start(), walk(42)).take(50).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_elapsed_time_keeps_price() {
        let mut gen = walk(1);
        assert_eq!(gen.price_after(Duration::zero()), 40.0);
    }

    #[test]
    fn negative_volatility_is_rejected() {
        assert!(PriceRandomWalk::new(StdRng::seed_from_u64(0), 40.0, 0.0, -1.0).is_err());
    }
}
