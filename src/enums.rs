use std::fmt;
use std::str::FromStr;

/// Modalities the imager knows how to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    RtImage,
    RtDose,
    Ct,
    Nm,
    Pt,
    Mr,
    Ot,
    Xa,
}

impl Modality {
    pub const ALL: [Modality; 8] = [
        Modality::RtImage,
        Modality::RtDose,
        Modality::Ct,
        Modality::Nm,
        Modality::Pt,
        Modality::Mr,
        Modality::Ot,
        Modality::Xa,
    ];

    /// The code string used in the Modality attribute
    pub fn code(&self) -> &'static str {
        match self {
            Modality::RtImage => "RTIMAGE",
            Modality::RtDose => "RTDOSE",
            Modality::Ct => "CT",
            Modality::Nm => "NM",
            Modality::Pt => "PT",
            Modality::Mr => "MR",
            Modality::Ot => "OT",
            Modality::Xa => "XA",
        }
    }
}

impl FromStr for Modality {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Modality::ALL
            .into_iter()
            .find(|modality| modality.code() == code)
            .ok_or(())
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether calibrated intensity increases (`Positive`) or decreases
/// (`Negative`) with the stored pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

impl Polarity {
    /// Polarity implied by a rescale slope. A zero slope counts as positive.
    pub fn from_slope(slope: f64) -> Self {
        if slope < 0.0 {
            Polarity::Negative
        } else {
            Polarity::Positive
        }
    }

    /// Polarity from a PixelIntensityRelationshipSign value
    pub fn from_sign(sign: i32) -> Self {
        if sign < 0 {
            Polarity::Negative
        } else {
            Polarity::Positive
        }
    }

    pub fn sign(&self) -> i32 {
        match self {
            Polarity::Positive => 1,
            Polarity::Negative => -1,
        }
    }
}

/// How [`crate::volume::VolumeModel::avg_images`] treats calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AveragePolicy {
    /// Mean of the stored intensities, calibration ignored.
    #[default]
    Raw,
    /// Mean of the calibrated planes, recalibrated into the stored range the
    /// same way a sum is.
    Calibrated,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
