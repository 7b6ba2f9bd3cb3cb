//! Static parent/child topology of the hand marker schema
//!
//! Names follow `Hands_<hand>_<finger><segment>`, e.g. `Hands_R_L4`:
//! - hand is `L` or `R`
//! - finger is `T` (thumb), `I` (index), `M` (middle), `R` (ring) or `L` (little)
//! - segment runs from 1 at the knuckle to 4 at the fingertip
//!
//! Besides the digits, each hand carries three reference pairs on the wrist
//! and arm (`Cout`/`Cin`, `Aout`/`Ain`, `Wout`/`Win`). Every marker has at
//! most one parent and one child; names outside the schema have neither.

/// Parent -> child edges of the schema
const BONES: &[(&str, &str)] = &[
    ("Hands_L_T1", "Hands_L_T2"),
    ("Hands_L_T2", "Hands_L_T3"),
    ("Hands_L_T3", "Hands_L_T4"),
    ("Hands_L_I1", "Hands_L_I2"),
    ("Hands_L_I2", "Hands_L_I3"),
    ("Hands_L_I3", "Hands_L_I4"),
    ("Hands_L_M1", "Hands_L_M2"),
    ("Hands_L_M2", "Hands_L_M3"),
    ("Hands_L_M3", "Hands_L_M4"),
    ("Hands_L_R1", "Hands_L_R2"),
    ("Hands_L_R2", "Hands_L_R3"),
    ("Hands_L_R3", "Hands_L_R4"),
    ("Hands_L_L1", "Hands_L_L2"),
    ("Hands_L_L2", "Hands_L_L3"),
    ("Hands_L_L3", "Hands_L_L4"),
    ("Hands_L_Cout", "Hands_L_Cin"),
    ("Hands_L_Aout", "Hands_L_Ain"),
    ("Hands_L_Wout", "Hands_L_Win"),
    ("Hands_R_T1", "Hands_R_T2"),
    ("Hands_R_T2", "Hands_R_T3"),
    ("Hands_R_T3", "Hands_R_T4"),
    ("Hands_R_I1", "Hands_R_I2"),
    ("Hands_R_I2", "Hands_R_I3"),
    ("Hands_R_I3", "Hands_R_I4"),
    ("Hands_R_M1", "Hands_R_M2"),
    ("Hands_R_M2", "Hands_R_M3"),
    ("Hands_R_M3", "Hands_R_M4"),
    ("Hands_R_R1", "Hands_R_R2"),
    ("Hands_R_R2", "Hands_R_R3"),
    ("Hands_R_R3", "Hands_R_R4"),
    ("Hands_R_L1", "Hands_R_L2"),
    ("Hands_R_L2", "Hands_R_L3"),
    ("Hands_R_L3", "Hands_R_L4"),
    ("Hands_R_Cout", "Hands_R_Cin"),
    ("Hands_R_Aout", "Hands_R_Ain"),
    ("Hands_R_Wout", "Hands_R_Win"),
];

/// Finger codes (`<hand>_<finger>`) of both hands, thumb first
pub const FINGERS: [&str; 10] = [
    "R_T", "R_I", "R_M", "R_R", "R_L", "L_T", "L_I", "L_M", "L_R", "L_L",
];

/// Anatomically adjacent finger pairs checked for crossover.
/// The thumbs of both hands are paired since they share the same region.
pub const FINGER_PAIRS: [(&str, &str); 7] = [
    ("R_T", "L_T"),
    ("R_L", "R_R"),
    ("L_R", "L_L"),
    ("R_R", "R_M"),
    ("L_M", "L_R"),
    ("R_M", "R_I"),
    ("L_I", "L_M"),
];

pub fn parent(name: &str) -> Option<&'static str> {
    BONES
        .iter()
        .find(|(_, child)| *child == name)
        .map(|(parent, _)| *parent)
}

pub fn child(name: &str) -> Option<&'static str> {
    BONES
        .iter()
        .find(|(parent, _)| *parent == name)
        .map(|(_, child)| *child)
}

/// Canonical name of segment `segment` (1..=4) of `finger` (e.g. `"R_T"`)
pub fn finger_marker(finger: &str, segment: u8) -> String {
    format!("Hands_{finger}{segment}")
}
