//! Relaxation of the interface displacement handed to the particle field.

use super::interface::InterfaceVector;
use crate::algs::communicator::Communicator;
use crate::deck_error::DeckError;

#[derive(Clone, Debug, PartialEq)]
pub enum RelaxationScheme {
    /// Accept the structural displacement as is.
    None,
    Constant { omega: f64 },
    /// Aitken's delta^2 method.
    Aitken {
        start_omega: f64,
        min_omega: f64,
        max_omega: f64,
    },
}

/// Aitken update of the relaxation parameter from the previous raw
/// increment `d0` and the current one `d1`:
/// `-omega_prev * (d0 . (d1 - d0)) / |d1 - d0|^2`, clamped into
/// `[min_omega, max_omega]`. A vanishing denominator keeps `omega_prev`.
pub fn aitken_omega(
    omega_prev: f64,
    d0_dot_diff: f64,
    diff_norm_sq: f64,
    min_omega: f64,
    max_omega: f64,
) -> f64 {
    if diff_norm_sq == 0.0 {
        return omega_prev;
    }
    let omega = -omega_prev * d0_dot_diff / diff_norm_sq;
    omega.min(max_omega).max(min_omega)
}

/// Relaxation parameter and the raw increment of the previous outer
/// iteration.
#[derive(Clone, Debug)]
pub struct Relaxation {
    scheme: RelaxationScheme,
    omega: f64,
    previous_increment: Option<InterfaceVector>,
}

impl Relaxation {
    pub fn new(scheme: RelaxationScheme) -> Self {
        let omega = match scheme {
            RelaxationScheme::None => 1.0,
            RelaxationScheme::Constant { omega } => omega,
            RelaxationScheme::Aitken { start_omega, .. } => start_omega,
        };
        Self {
            scheme,
            omega,
            previous_increment: None,
        }
    }

    pub fn scheme(&self) -> &RelaxationScheme {
        &self.scheme
    }

    /// False for the unrelaxed scheme.
    pub fn is_relaxing(&self) -> bool {
        self.scheme != RelaxationScheme::None
    }

    pub fn omega(&self) -> f64 {
        self.omega
    }

    pub fn set_omega(&mut self, omega: f64) {
        self.omega = omega;
    }

    /// Relaxation parameter for outer iteration `itnum` (1-based) given its
    /// raw displacement increment. Collective over `comm` for Aitken.
    pub fn update_omega<C: Communicator>(
        &mut self,
        comm: &C,
        itnum: usize,
        increment: &InterfaceVector,
    ) -> Result<f64, DeckError> {
        if let RelaxationScheme::Aitken {
            min_omega,
            max_omega,
            ..
        } = self.scheme
        {
            if itnum > 1 {
                if let Some(d0) = &self.previous_increment {
                    let diff = increment.difference(d0)?;
                    let d0_dot_diff = d0.dot(&diff, comm)?;
                    let diff_norm_sq = diff.dot(&diff, comm)?;
                    self.omega =
                        aitken_omega(self.omega, d0_dot_diff, diff_norm_sq, min_omega, max_omega);
                }
            }
            self.previous_increment = Some(increment.clone());
        }
        Ok(self.omega)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn aitken_value_above_the_bound_is_clamped() {
        // d0 = (1, 0), d1 = (-0.5, 0): d1 - d0 = (-1.5, 0),
        // raw omega = -1 * (-1.5) / 2.25 = 2/3
        let raw = aitken_omega(1.0, -1.5, 2.25, 0.0, 10.0);
        assert!((raw - 2.0 / 3.0).abs() < 1e-14);

        // d0 = (1, 0), d1 = (1/3, 0): d1 - d0 = (-2/3, 0),
        // raw omega = -1 * (-2/3) / (4/9) = 1.5, clamped to 1.0
        let d0 = InterfaceVector::from_pairs([(0, 1.0), (1, 0.0)]);
        let d1 = InterfaceVector::from_pairs([(0, 1.0 / 3.0), (1, 0.0)]);
        let diff = d1.difference(&d0).expect("layout");
        let unclamped = aitken_omega(
            1.0,
            d0.dot(&diff, &NoComm).expect("dot"),
            diff.dot(&diff, &NoComm).expect("dot"),
            f64::MIN,
            f64::MAX,
        );
        assert!((unclamped - 1.5).abs() < 1e-12);

        let mut relax = Relaxation::new(RelaxationScheme::Aitken {
            start_omega: 1.0,
            min_omega: 0.1,
            max_omega: 1.0,
        });
        assert_eq!(relax.update_omega(&NoComm, 1, &d0).expect("first"), 1.0);
        assert_eq!(relax.update_omega(&NoComm, 2, &d1).expect("second"), 1.0);
    }

    #[test]
    fn zero_denominator_keeps_omega() {
        assert_eq!(aitken_omega(0.7, 0.0, 0.0, 0.1, 1.0), 0.7);
        let mut relax = Relaxation::new(RelaxationScheme::Aitken {
            start_omega: 0.4,
            min_omega: 0.1,
            max_omega: 1.0,
        });
        let d = InterfaceVector::from_pairs([(0, 2.0)]);
        relax.update_omega(&NoComm, 1, &d).expect("first");
        assert_eq!(relax.update_omega(&NoComm, 2, &d).expect("second"), 0.4);
    }

    #[test]
    fn constant_and_plain_schemes_never_change() {
        let d = InterfaceVector::from_pairs([(0, 2.0)]);
        let mut constant = Relaxation::new(RelaxationScheme::Constant { omega: 0.3 });
        assert!(constant.is_relaxing());
        assert_eq!(constant.update_omega(&NoComm, 5, &d).expect("omega"), 0.3);
        let mut plain = Relaxation::new(RelaxationScheme::None);
        assert!(!plain.is_relaxing());
        assert_eq!(plain.update_omega(&NoComm, 5, &d).expect("omega"), 1.0);
    }
}
