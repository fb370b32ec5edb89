//! CMVN parameter loading and application
//!
//! The stats file is a kaldi-nnet text archive carrying an `<AddShift>`
//! component (means) and a `<Rescale>` component (variance scales), each
//! followed by a `<LearnRateCoef>` line whose bracketed vector holds the
//! values. Normalization is `(x + mean) * var` per dimension — the mean is
//! added, not subtracted; that is the stored convention.

use std::fs;
use std::path::Path;

use crate::PipelineError;

#[derive(Clone, Debug)]
pub struct Cmvn {
    pub means: Vec<f32>,
    pub vars: Vec<f32>,
}

impl Cmvn {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            PipelineError::Init(format!(
                "cannot read cmvn file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let lines: Vec<&str> = text.lines().collect();

        let mut means = Vec::new();
        let mut vars = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let first = line.split_whitespace().next().unwrap_or("");
            let target = match first {
                "<AddShift>" => &mut means,
                "<Rescale>" => &mut vars,
                _ => continue,
            };

            let next = lines
                .get(i + 1)
                .ok_or_else(|| PipelineError::Init("truncated cmvn file".to_string()))?;
            let items: Vec<&str> = next.split_whitespace().collect();
            if items.first() != Some(&"<LearnRateCoef>") || items.len() < 5 {
                continue;
            }

            // Vector payload sits between the learn-rate coefficient and the
            // closing bracket: <LearnRateCoef> 0 [ v0 v1 ... vN ]
            let payload = &items[3..items.len() - 1];
            *target = payload
                .iter()
                .map(|v| {
                    v.parse::<f32>().map_err(|e| {
                        PipelineError::Init(format!("bad cmvn value '{v}': {e}"))
                    })
                })
                .collect::<Result<Vec<f32>, _>>()?;
        }

        if means.is_empty() || vars.is_empty() {
            return Err(PipelineError::Init(
                "cmvn file missing <AddShift> or <Rescale> vectors".to_string(),
            ));
        }
        if means.len() != vars.len() {
            return Err(PipelineError::Init(format!(
                "cmvn mean/var dimension mismatch: {} vs {}",
                means.len(),
                vars.len()
            )));
        }

        Ok(Self { means, vars })
    }

    pub fn dim(&self) -> usize {
        self.means.len()
    }

    /// Apply `(x + mean) * var` in place to each feature row.
    pub fn apply(&self, features: &mut [Vec<f32>]) {
        for row in features.iter_mut() {
            let dim = row.len().min(self.means.len());
            for d in 0..dim {
                row[d] = (row[d] + self.means[d]) * self.vars[d];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "<Nnet>\n\
<AddShift> 4 4\n\
<LearnRateCoef> 0 [ -1.0 -2.0 -3.0 -4.0 ]\n\
<Rescale> 4 4\n\
<LearnRateCoef> 0 [ 0.5 0.5 2.0 2.0 ]\n\
</Nnet>\n";

    #[test]
    fn test_parse_sample() {
        let cmvn = Cmvn::parse(SAMPLE).unwrap();
        assert_eq!(cmvn.dim(), 4);
        assert_eq!(cmvn.means, vec![-1.0, -2.0, -3.0, -4.0]);
        assert_eq!(cmvn.vars, vec![0.5, 0.5, 2.0, 2.0]);
    }

    #[test]
    fn test_apply_adds_mean_then_scales() {
        let cmvn = Cmvn::parse(SAMPLE).unwrap();
        let mut feats = vec![vec![2.0f32, 4.0, 6.0, 8.0]];
        cmvn.apply(&mut feats);
        // (x + mean) * var
        assert_eq!(feats[0], vec![0.5, 1.0, 6.0, 8.0]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cmvn = Cmvn::load(file.path()).unwrap();
        assert_eq!(cmvn.dim(), 4);
    }

    #[test]
    fn test_missing_sections_error() {
        assert!(Cmvn::parse("<Nnet>\n</Nnet>\n").is_err());
    }

    #[test]
    fn test_dimension_mismatch_errors() {
        let bad = "<AddShift> 2 2\n<LearnRateCoef> 0 [ 1.0 2.0 ]\n\
<Rescale> 3 3\n<LearnRateCoef> 0 [ 1.0 2.0 3.0 ]\n";
        assert!(Cmvn::parse(bad).is_err());
    }
}
