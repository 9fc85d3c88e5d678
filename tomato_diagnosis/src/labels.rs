use serde::Serialize;

pub const NUM_CLASSES: usize = 10;

/// Classes of the tomato leaf classifier, in model output order.
///
/// The discriminant is the position in the probability vector, so the order of
/// the variants is tied to the trained model and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiseaseLabel {
    BacterialSpot = 0,
    EarlyBlight = 1,
    LateBlight = 2,
    LeafMold = 3,
    SeptoriaLeafSpot = 4,
    SpiderMites = 5,
    TargetSpot = 6,
    YellowLeafCurlVirus = 7,
    MosaicVirus = 8,
    Healthy = 9,
}

impl DiseaseLabel {
    pub const ALL: [DiseaseLabel; NUM_CLASSES] = [
        DiseaseLabel::BacterialSpot,
        DiseaseLabel::EarlyBlight,
        DiseaseLabel::LateBlight,
        DiseaseLabel::LeafMold,
        DiseaseLabel::SeptoriaLeafSpot,
        DiseaseLabel::SpiderMites,
        DiseaseLabel::TargetSpot,
        DiseaseLabel::YellowLeafCurlVirus,
        DiseaseLabel::MosaicVirus,
        DiseaseLabel::Healthy,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Class directory name of the training dataset.
    pub fn class_name(self) -> &'static str {
        match self {
            DiseaseLabel::BacterialSpot => "Tomato___Bacterial_spot",
            DiseaseLabel::EarlyBlight => "Tomato___Early_blight",
            DiseaseLabel::LateBlight => "Tomato___Late_blight",
            DiseaseLabel::LeafMold => "Tomato___Leaf_Mold",
            DiseaseLabel::SeptoriaLeafSpot => "Tomato___Septoria_leaf_spot",
            DiseaseLabel::SpiderMites => "Tomato___Spider_mites Two-spotted_spider_mite",
            DiseaseLabel::TargetSpot => "Tomato___Target_Spot",
            DiseaseLabel::YellowLeafCurlVirus => "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
            DiseaseLabel::MosaicVirus => "Tomato___Tomato_mosaic_virus",
            DiseaseLabel::Healthy => "Tomato___healthy",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DiseaseLabel::BacterialSpot => "Bacterial spot",
            DiseaseLabel::EarlyBlight => "Early blight",
            DiseaseLabel::LateBlight => "Late blight",
            DiseaseLabel::LeafMold => "Leaf Mold",
            DiseaseLabel::SeptoriaLeafSpot => "Septoria leaf spot",
            DiseaseLabel::SpiderMites => "Spider mites Two-spotted spider mite",
            DiseaseLabel::TargetSpot => "Target Spot",
            DiseaseLabel::YellowLeafCurlVirus => "Yellow Leaf Curl Virus",
            DiseaseLabel::MosaicVirus => "Mosaic virus",
            DiseaseLabel::Healthy => "Healthy",
        }
    }

    pub fn treatment(self) -> &'static str {
        match self {
            DiseaseLabel::BacterialSpot => {
                "Remove affected leaves and apply copper-based fungicides. Improve air circulation."
            }
            DiseaseLabel::EarlyBlight => {
                "Remove infected plant debris. Apply fungicides containing chlorothalonil or copper."
            }
            DiseaseLabel::LateBlight => {
                "Remove affected plants immediately. Apply fungicides and ensure good air circulation."
            }
            DiseaseLabel::LeafMold => {
                "Reduce humidity and improve ventilation. Apply fungicides if necessary."
            }
            DiseaseLabel::SeptoriaLeafSpot => {
                "Remove lower leaves and apply fungicides. Avoid overhead watering."
            }
            DiseaseLabel::SpiderMites => {
                "Increase humidity around plants. Use miticides or beneficial insects."
            }
            DiseaseLabel::TargetSpot => {
                "Remove affected leaves and apply fungicides. Avoid overhead irrigation."
            }
            DiseaseLabel::YellowLeafCurlVirus => {
                "Remove infected plants. Control whitefly vectors with insecticides."
            }
            DiseaseLabel::MosaicVirus => {
                "Remove infected plants. Control aphid vectors and use virus-free seeds."
            }
            DiseaseLabel::Healthy => {
                "Your tomato plant looks healthy! Continue with proper care and monitoring."
            }
        }
    }
}
