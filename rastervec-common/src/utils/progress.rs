/*
This code is part of the RasterVec geospatial analysis library.
Authors: Pere Comas
Created: 21/01/2025
Last Modified: 21/01/2025
License: MIT
*/

/// Capability through which long-running scans report their progress.
///
/// `report` receives a fraction in `[0, 1]` and a short message. Returning
/// `false` asks the running operation to stop; the operation unwinds with an
/// `Interrupted` error and partially written output is left as-is.
pub trait ProgressReporter {
    fn report(&mut self, fraction: f64, message: &str) -> bool;
}

impl<F> ProgressReporter for F
where
    F: FnMut(f64, &str) -> bool,
{
    fn report(&mut self, fraction: f64, message: &str) -> bool {
        self(fraction, message)
    }
}

/// A reporter that discards progress and never interrupts.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn report(&mut self, _fraction: f64, _message: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn closures_are_reporters() {
        let mut fractions = vec![];
        {
            let mut progress = |f: f64, _: &str| -> bool {
                fractions.push(f);
                true
            };
            assert!(progress.report(0.5, ""));
        }
        assert_eq!(fractions, vec![0.5]);
    }

    #[test]
    fn silent_progress_never_interrupts() {
        let mut progress = SilentProgress;
        assert!(progress.report(1.0, "done"));
    }
}
