use unicode_normalization::UnicodeNormalization;

use crate::model::{Farm, Labelled, PredefinedProjectName};

pub const DEFAULT_CONTACT_SEPARATOR: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceFilter {
    Sugar,
    Sensor,
    Corporate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportFilter {
    /// No support program on any plot.
    NoPrograms,
    /// At least one program, optionally restricted to an inclusive year range.
    HasPrograms {
        from_year: Option<i32>,
        to_year: Option<i32>,
    },
}

/// Alternate-bearing query for one year.
///
/// `occurred: false` also matches farms with no annual data for that year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlternateBearingFilter {
    pub year: i32,
    pub occurred: bool,
}

/// Independently optional criteria, AND-ed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub search: Option<String>,
    pub service: Option<ServiceFilter>,
    pub support: Option<SupportFilter>,
    pub project: Option<PredefinedProjectName>,
    pub alternate_bearing: Option<AlternateBearingFilter>,
    pub contact_separator: char,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        FilterCriteria {
            search: None,
            service: None,
            support: None,
            project: None,
            alternate_bearing: None,
            contact_separator: DEFAULT_CONTACT_SEPARATOR,
        }
    }
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.search_term().is_none()
            && self.service.is_none()
            && self.support.is_none()
            && self.project.is_none()
            && self.alternate_bearing.is_none()
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(fold)
            .filter(|term| !term.trim().is_empty())
    }

    pub fn matches(&self, farm: &Farm) -> bool {
        self.matches_search(farm)
            && self.matches_service(farm)
            && self.matches_support(farm)
            && self.matches_project(farm)
            && self.matches_alternate_bearing(farm)
    }

    fn matches_search(&self, farm: &Farm) -> bool {
        let Some(term) = self.search_term() else {
            return true;
        };
        if fold(&farm.name).contains(&term) {
            return true;
        }
        let contact = fold(&farm.contact);
        if contact.contains(&term) {
            return true;
        }
        let bare_term = strip(&term, self.contact_separator);
        !bare_term.is_empty() && strip(&contact, self.contact_separator).contains(&bare_term)
    }

    fn matches_service(&self, farm: &Farm) -> bool {
        match self.service {
            None => true,
            Some(ServiceFilter::Sugar) => farm
                .plots
                .iter()
                .any(|p| p.service_info.sugar_service.is_used()),
            Some(ServiceFilter::Sensor) => farm
                .plots
                .iter()
                .any(|p| p.service_info.sensor_service.is_used()),
            Some(ServiceFilter::Corporate) => farm.plots.iter().any(|p| p.corporate.is_corporate()),
        }
    }

    fn matches_support(&self, farm: &Farm) -> bool {
        match self.support {
            None => true,
            Some(SupportFilter::NoPrograms) => farm.support_programs().next().is_none(),
            Some(SupportFilter::HasPrograms { from_year, to_year }) => {
                farm.support_programs().any(|program| {
                    from_year.map_or(true, |start| program.year >= start)
                        && to_year.map_or(true, |end| program.year <= end)
                })
            }
        }
    }

    fn matches_project(&self, farm: &Farm) -> bool {
        let Some(selected) = self.project else {
            return true;
        };
        farm.support_programs().any(|program| {
            match PredefinedProjectName::matching(&program.project_name) {
                Some(name) => name == selected,
                None => selected == PredefinedProjectName::Etc,
            }
        })
    }

    fn matches_alternate_bearing(&self, farm: &Farm) -> bool {
        let Some(query) = self.alternate_bearing else {
            return true;
        };
        // Only the first entry recorded for the year counts on each plot.
        let occurred = farm.plots.iter().any(|plot| {
            plot.annual_data
                .iter()
                .find(|entry| entry.year == query.year)
                .is_some_and(|entry| entry.has_alternate_bearing)
        });
        occurred == query.occurred
    }
}

/// Farms matching every active criterion, in input order.
pub fn filter(farms: &[Farm], criteria: &FilterCriteria) -> Vec<Farm> {
    farms
        .iter()
        .filter(|farm| criteria.matches(farm))
        .cloned()
        .collect()
}

impl std::str::FromStr for ServiceFilter {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sugar" => Ok(ServiceFilter::Sugar),
            "sensor" => Ok(ServiceFilter::Sensor),
            "corporate" => Ok(ServiceFilter::Corporate),
            other => Err(format!("unknown service filter `{other}`")),
        }
    }
}

/// Parses a project selection given either as its label or its ASCII code.
pub fn parse_project(raw: &str) -> Result<PredefinedProjectName, String> {
    PredefinedProjectName::from_label(raw).ok_or_else(|| format!("unknown project name `{raw}`"))
}

fn fold(value: &str) -> String {
    value.nfc().collect::<String>().to_lowercase()
}

fn strip(value: &str, separator: char) -> String {
    value.chars().filter(|c| *c != separator).collect()
}
