//! Canonical farm record schema.
//!
//! The in-memory shape uses sum types for the conditional blocks (corporate details,
//! contract terms, service usage) so that "flag set but details missing" cannot be
//! represented. The JSON wire shape is the flat camelCase layout used by backups and
//! the HTTP surface; [`Plot`] and [`ServiceInfo`] serialize through private wire
//! structs. Decoding always goes through [`crate::normalize`], which accepts every
//! historical generation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lookup helpers shared by the closed label sets stored as display strings.
pub trait Labelled: Sized + Copy + 'static {
    const ALL: &'static [Self];

    /// Stored/display label.
    fn label(self) -> &'static str;

    /// Stable ASCII code, accepted as an alias when decoding.
    fn code(self) -> &'static str;

    fn from_label(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Self::ALL
            .iter()
            .copied()
            .find(|item| item.label() == value || item.code().eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoveringType {
    Hybrix,
    DolcomBrix,
    Truss,
    Tyvek,
}

impl Labelled for CoveringType {
    const ALL: &'static [Self] = &[Self::Hybrix, Self::DolcomBrix, Self::Truss, Self::Tyvek];

    fn label(self) -> &'static str {
        match self {
            Self::Hybrix => "하이브릭스",
            Self::DolcomBrix => "돌콤브릭스",
            Self::Truss => "트러스",
            Self::Tyvek => "타이벡",
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::Hybrix => "HYBRIX",
            Self::DolcomBrix => "DOLCOM_BRIX",
            Self::Truss => "TRUSS",
            Self::Tyvek => "TYVEK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsultationCategory {
    Consultation,
    Pruning,
    PesticideFertilizer,
    Irrigation,
    Mulching,
    Harvest,
    Etc,
}

impl Labelled for ConsultationCategory {
    const ALL: &'static [Self] = &[
        Self::Consultation,
        Self::Pruning,
        Self::PesticideFertilizer,
        Self::Irrigation,
        Self::Mulching,
        Self::Harvest,
        Self::Etc,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Consultation => "상담",
            Self::Pruning => "전정",
            Self::PesticideFertilizer => "농약/비료",
            Self::Irrigation => "관수",
            Self::Mulching => "멀칭",
            Self::Harvest => "수확",
            Self::Etc => "기타",
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::Consultation => "CONSULTATION",
            Self::Pruning => "PRUNING",
            Self::PesticideFertilizer => "PESTICIDE_FERTILIZER",
            Self::Irrigation => "IRRIGATION",
            Self::Mulching => "MULCHING",
            Self::Harvest => "HARVEST",
            Self::Etc => "ETC",
        }
    }
}

/// Support-program names offered as fixed choices. Anything else counts as [`Self::Etc`]
/// for filtering purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedProjectName {
    VarietyRenewal,
    TreeTransplant,
    SoilCovering,
    ProvincialData,
    MafraData,
    UniversityLink,
    Etc,
}

impl Labelled for PredefinedProjectName {
    const ALL: &'static [Self] = &[
        Self::VarietyRenewal,
        Self::TreeTransplant,
        Self::SoilCovering,
        Self::ProvincialData,
        Self::MafraData,
        Self::UniversityLink,
        Self::Etc,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::VarietyRenewal => "품종갱신",
            Self::TreeTransplant => "성목이식",
            Self::SoilCovering => "토양피목",
            Self::ProvincialData => "도청데이터사업",
            Self::MafraData => "농림부데이터확산사업",
            Self::UniversityLink => "대학연계사업",
            Self::Etc => "기타",
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::VarietyRenewal => "VARIETY_RENEWAL",
            Self::TreeTransplant => "TREE_TRANSPLANT",
            Self::SoilCovering => "SOIL_COVERING",
            Self::ProvincialData => "PROVINCIAL_DATA",
            Self::MafraData => "MAFRA_DATA",
            Self::UniversityLink => "UNIVERSITY_LINK",
            Self::Etc => "ETC",
        }
    }
}

impl PredefinedProjectName {
    /// Exact match against the stored label; free-text names return `None`.
    pub fn matching(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.label() == name)
    }
}

fn serialize_label<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Labelled,
{
    serializer.serialize_str(value.map(Labelled::label).unwrap_or(""))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityInfo {
    pub slope: String,
    pub planting_distance: String,
    pub has_covering: bool,
    #[serde(serialize_with = "serialize_label")]
    pub covering_type: Option<CoveringType>,
    pub has_power: bool,
    pub has_internet: bool,
    pub has_umbrella_system: bool,
    pub has_drip_hose: bool,
    pub has_sprinkler: bool,
    pub has_windbreak: bool,
    pub has_opener: bool,
}

/// Usage of one external service; the detail text only exists while the service is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServiceUsage {
    #[default]
    Unused,
    Used { detail: String },
}

impl ServiceUsage {
    pub fn is_used(&self) -> bool {
        matches!(self, ServiceUsage::Used { .. })
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ServiceUsage::Used { detail } => Some(detail.as_str()),
            ServiceUsage::Unused => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(into = "ServiceInfoWire")]
pub struct ServiceInfo {
    pub portal_id: String,
    pub portal_password: String,
    pub sugar_service: ServiceUsage,
    pub sensor_service: ServiceUsage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfoWire {
    jacheongbi_id: String,
    jacheongbi_pw: String,
    use_sugar_service: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sugar_meter_info: Option<String>,
    use_sensor_service: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensor_info: Option<String>,
}

impl From<ServiceInfo> for ServiceInfoWire {
    fn from(info: ServiceInfo) -> Self {
        ServiceInfoWire {
            use_sugar_service: info.sugar_service.is_used(),
            sugar_meter_info: info.sugar_service.detail().map(str::to_owned),
            use_sensor_service: info.sensor_service.is_used(),
            sensor_info: info.sensor_service.detail().map(str::to_owned),
            jacheongbi_id: info.portal_id,
            jacheongbi_pw: info.portal_password,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportProgram {
    pub id: String,
    pub year: i32,
    pub project_name: String,
    pub project_description: String,
    pub local_govt_fund: i64,
    pub self_fund: i64,
    pub is_selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualData {
    pub id: String,
    pub year: i32,
    pub avg_brix: f64,
    pub has_alternate_bearing: bool,
    pub estimated_yield: i64,
    pub price_per_gwan: i64,
    pub shipping_season: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationLog {
    pub id: String,
    pub date: String,
    #[serde(serialize_with = "serialize_label")]
    pub category: Option<ConsultationCategory>,
    pub content: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractTerms {
    pub contract_date: String,
    pub down_payment: i64,
    pub balance_due_date: String,
    pub balance_payment: i64,
    pub mulching_work_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContractStatus {
    #[default]
    Uncontracted,
    Contracted(ContractTerms),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorporateDetails {
    pub year: i32,
    pub consultation_date: String,
    pub estimated_quantity: i64,
    pub contracted_quantity: i64,
    pub special_notes: String,
    pub contract: ContractStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorporateStatus {
    #[default]
    NotCorporate,
    Corporate(CorporateDetails),
}

impl CorporateStatus {
    pub fn is_corporate(&self) -> bool {
        matches!(self, CorporateStatus::Corporate(_))
    }

    pub fn details(&self) -> Option<&CorporateDetails> {
        match self {
            CorporateStatus::Corporate(details) => Some(details),
            CorporateStatus::NotCorporate => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(into = "PlotWire")]
pub struct Plot {
    pub id: String,
    pub address: String,
    pub area_pyeong: f64,
    pub cultivar: String,
    pub tree_count: i64,
    pub corporate: CorporateStatus,
    pub facility_info: FacilityInfo,
    pub service_info: ServiceInfo,
    pub annual_data: Vec<AnnualData>,
    pub consultation_logs: Vec<ConsultationLog>,
    pub support_programs: Vec<SupportProgram>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlotWire {
    id: String,
    address: String,
    area_pyeong: f64,
    cultivar: String,
    tree_count: i64,
    is_corporate: bool,
    facility_info: FacilityInfo,
    service_info: ServiceInfo,
    annual_data: Vec<AnnualData>,
    consultation_logs: Vec<ConsultationLog>,
    support_programs: Vec<SupportProgram>,
    #[serde(skip_serializing_if = "Option::is_none")]
    corporate_farm_details: Option<CorporateWire>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CorporateWire {
    year: i32,
    consultation_date: String,
    estimated_quantity: i64,
    contracted_quantity: i64,
    is_contracted: bool,
    special_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    contract_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    down_payment: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance_due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance_payment: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mulching_work_date: Option<String>,
}

impl From<CorporateDetails> for CorporateWire {
    fn from(details: CorporateDetails) -> Self {
        let terms = match details.contract {
            ContractStatus::Contracted(terms) => Some(terms),
            ContractStatus::Uncontracted => None,
        };
        CorporateWire {
            year: details.year,
            consultation_date: details.consultation_date,
            estimated_quantity: details.estimated_quantity,
            contracted_quantity: details.contracted_quantity,
            is_contracted: terms.is_some(),
            special_notes: details.special_notes,
            contract_date: terms.as_ref().map(|t| t.contract_date.clone()),
            down_payment: terms.as_ref().map(|t| t.down_payment),
            balance_due_date: terms.as_ref().map(|t| t.balance_due_date.clone()),
            balance_payment: terms.as_ref().map(|t| t.balance_payment),
            mulching_work_date: terms.map(|t| t.mulching_work_date),
        }
    }
}

impl From<Plot> for PlotWire {
    fn from(plot: Plot) -> Self {
        let is_corporate = plot.corporate.is_corporate();
        let corporate_farm_details = match plot.corporate {
            CorporateStatus::Corporate(details) => Some(CorporateWire::from(details)),
            CorporateStatus::NotCorporate => None,
        };
        PlotWire {
            id: plot.id,
            address: plot.address,
            area_pyeong: plot.area_pyeong,
            cultivar: plot.cultivar,
            tree_count: plot.tree_count,
            is_corporate,
            facility_info: plot.facility_info,
            service_info: plot.service_info,
            annual_data: plot.annual_data,
            consultation_logs: plot.consultation_logs,
            support_programs: plot.support_programs,
            corporate_farm_details,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    pub id: String,
    pub name: String,
    pub contact: String,
    pub plots: Vec<Plot>,
}

impl<'de> Deserialize<'de> for Farm {
    /// Any historical record shape is accepted; see [`crate::normalize`].
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(crate::normalize::normalize_record(&raw))
    }
}

impl Farm {
    pub fn total_area(&self) -> f64 {
        self.plots.iter().map(|p| p.area_pyeong).sum()
    }

    pub fn support_programs(&self) -> impl Iterator<Item = &SupportProgram> {
        self.plots.iter().flat_map(|p| p.support_programs.iter())
    }
}
