//! Krumhansl-Schmuckler key templates
//!
//! Defines tonal profiles for 24 keys (12 major + 12 minor). Profiles are
//! stored unit-normalized, so a dot product with a unit chroma vector is a
//! cosine correlation.

/// Krumhansl-Kessler probe-tone ratings for C major
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler probe-tone ratings for C minor
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Key templates for all 24 keys
#[derive(Debug, Clone)]
pub struct KeyTemplates {
    /// Major key templates (12 keys: C, C#, D, ..., B)
    pub major: [[f32; 12]; 12],

    /// Minor key templates (12 keys: C, C#, D, ..., B)
    pub minor: [[f32; 12]; 12],
}

impl KeyTemplates {
    /// Create unit-normalized templates rotated to every tonic
    pub fn new() -> Self {
        Self {
            major: rotations(&unit(&MAJOR_PROFILE)),
            minor: rotations(&unit(&MINOR_PROFILE)),
        }
    }

    /// Template for a major key (0 = C)
    pub fn get_major_template(&self, key_idx: u32) -> &[f32; 12] {
        &self.major[key_idx as usize % 12]
    }

    /// Template for a minor key (0 = C)
    pub fn get_minor_template(&self, key_idx: u32) -> &[f32; 12] {
        &self.minor[key_idx as usize % 12]
    }
}

impl Default for KeyTemplates {
    fn default() -> Self {
        Self::new()
    }
}

fn unit(profile: &[f32; 12]) -> [f32; 12] {
    let norm = profile.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mut out = *profile;
    if norm > 0.0 {
        out.iter_mut().for_each(|x| *x /= norm);
    }
    out
}

/// `rotated[tonic][pc] = profile[(pc - tonic) mod 12]`
fn rotations(profile: &[f32; 12]) -> [[f32; 12]; 12] {
    let mut out = [[0.0f32; 12]; 12];
    for (tonic, template) in out.iter_mut().enumerate() {
        for (pc, value) in template.iter_mut().enumerate() {
            *value = profile[(pc + 12 - tonic) % 12];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_unit_norm() {
        let templates = KeyTemplates::new();
        for t in templates.major.iter().chain(templates.minor.iter()) {
            let norm = t.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rotation_moves_tonic_weight() {
        let templates = KeyTemplates::new();
        let g_major = templates.get_major_template(7);
        let c_major = templates.get_major_template(0);
        assert_eq!(g_major[7], c_major[0]);
        // Dominant of G is D
        assert_eq!(g_major[2], c_major[7]);
    }
}
