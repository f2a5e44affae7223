//! Navigation selection and its transitions.
//!
//! [`Selection`] is a plain value; every transition borrows the current
//! selection and returns the next one, so transitions can be tested without
//! any rendering or fetching. Entities are referenced by id and validated
//! against the [`RegionIndex`] on every transition.
//!
//! Level invariants:
//!
//! | level    | province | regency  | district |
//! |----------|----------|----------|----------|
//! | Province | focus?   | -        | -        |
//! | Regency  | set      | focus?   | -        |
//! | District | set      | set      | focus?   |
//! | Village  | set      | set      | set      |
//!
//! A "focus" is a selection at the level currently displayed. It locks that
//! level: other entities at the level become inert until released, ascended
//! from, or reset.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::index::{District, Province, Regency, RegionIndex};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Province,
    Regency,
    District,
    Village,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Province => "province",
            Level::Regency => "regency",
            Level::District => "district",
            Level::Village => "village",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub level: Level,
    pub province: Option<String>,
    pub regency: Option<String>,
    pub district: Option<String>,
}

impl Selection {
    /// Selection right after the index has loaded.
    pub fn root() -> Self {
        Self::default()
    }

    /// The selection at the displayed level, if any.
    pub fn focused(&self) -> Option<&str> {
        match self.level {
            Level::Province => self.province.as_deref(),
            Level::Regency => self.regency.as_deref(),
            Level::District => self.district.as_deref(),
            Level::Village => None,
        }
    }

    /// Whether an entity at the displayed level is inert because a
    /// different one is focused.
    pub fn is_locked_out(&self, id: &str) -> bool {
        self.focused().is_some_and(|f| f != id)
    }

    pub fn focus(&self, index: &RegionIndex, id: &str) -> Result<Selection> {
        match self.level {
            Level::Province => {
                index
                    .find_province_by_id(id)
                    .ok_or_else(|| unknown("province", id))?;
            }
            Level::Regency => {
                self.province_in(index)?
                    .find_regency_by_id(id)
                    .ok_or_else(|| unknown("regency", id))?;
            }
            Level::District => {
                self.regency_in(index)?
                    .find_district_by_id(id)
                    .ok_or_else(|| unknown("district", id))?;
            }
            Level::Village => {
                return Err(NavError::InvalidTransition(
                    "villages are not index entities and cannot be focused".into(),
                ))
            }
        }
        self.check_lock(id)?;
        let mut next = self.clone();
        let slot = match self.level {
            Level::Province => &mut next.province,
            Level::Regency => &mut next.regency,
            _ => &mut next.district,
        };
        *slot = Some(id.to_string());
        Ok(next)
    }

    /// Drop the focus at the displayed level.
    pub fn release(&self) -> Selection {
        let mut next = self.clone();
        match self.level {
            Level::Province => next.province = None,
            Level::Regency => next.regency = None,
            Level::District => next.district = None,
            Level::Village => {}
        }
        next
    }

    pub fn descend_to_regency(&self, index: &RegionIndex, province_id: &str) -> Result<Selection> {
        self.expect_level(Level::Province, "descend to regencies")?;
        index
            .find_province_by_id(province_id)
            .ok_or_else(|| unknown("province", province_id))?;
        self.check_lock(province_id)?;
        Ok(Selection {
            level: Level::Regency,
            province: Some(province_id.to_string()),
            regency: None,
            district: None,
        })
    }

    pub fn descend_to_district(&self, index: &RegionIndex, regency_id: &str) -> Result<Selection> {
        self.expect_level(Level::Regency, "descend to districts")?;
        self.province_in(index)?
            .find_regency_by_id(regency_id)
            .ok_or_else(|| unknown("regency", regency_id))?;
        self.check_lock(regency_id)?;
        Ok(Selection {
            level: Level::District,
            province: self.province.clone(),
            regency: Some(regency_id.to_string()),
            district: None,
        })
    }

    pub fn descend_to_village(&self, index: &RegionIndex, district_id: &str) -> Result<Selection> {
        self.expect_level(Level::District, "descend to villages")?;
        self.regency_in(index)?
            .find_district_by_id(district_id)
            .ok_or_else(|| unknown("district", district_id))?;
        self.check_lock(district_id)?;
        Ok(Selection {
            level: Level::Village,
            province: self.province.clone(),
            regency: self.regency.clone(),
            district: Some(district_id.to_string()),
        })
    }

    /// Pop exactly one level. The parent level is shown unfocused, with the
    /// ancestors above it kept.
    pub fn ascend(&self) -> Result<Selection> {
        let next = match self.level {
            Level::Province => {
                return Err(NavError::InvalidTransition(
                    "already at the province level".into(),
                ))
            }
            Level::Regency => Selection::root(),
            Level::District => Selection {
                level: Level::Regency,
                province: self.province.clone(),
                regency: None,
                district: None,
            },
            Level::Village => Selection {
                level: Level::District,
                province: self.province.clone(),
                regency: self.regency.clone(),
                district: None,
            },
        };
        Ok(next)
    }

    pub fn reset(&self) -> Selection {
        Selection::root()
    }

    pub fn province_in<'a>(&self, index: &'a RegionIndex) -> Result<&'a Province> {
        let id = self
            .province
            .as_deref()
            .ok_or_else(|| NavError::InvalidTransition("no province selected".into()))?;
        index
            .find_province_by_id(id)
            .ok_or_else(|| unknown("province", id))
    }

    pub fn regency_in<'a>(&self, index: &'a RegionIndex) -> Result<&'a Regency> {
        let id = self
            .regency
            .as_deref()
            .ok_or_else(|| NavError::InvalidTransition("no regency selected".into()))?;
        self.province_in(index)?
            .find_regency_by_id(id)
            .ok_or_else(|| unknown("regency", id))
    }

    pub fn district_in<'a>(&self, index: &'a RegionIndex) -> Result<&'a District> {
        let id = self
            .district
            .as_deref()
            .ok_or_else(|| NavError::InvalidTransition("no district selected".into()))?;
        self.regency_in(index)?
            .find_district_by_id(id)
            .ok_or_else(|| unknown("district", id))
    }

    /// Names along the selected path, root first.
    pub fn breadcrumbs(&self, index: &RegionIndex) -> Vec<String> {
        let mut out = Vec::new();
        if let Ok(p) = self.province_in(index) {
            out.push(p.name.clone());
        }
        if let Ok(r) = self.regency_in(index) {
            out.push(r.name.clone());
        }
        if let Ok(d) = self.district_in(index) {
            out.push(d.name.clone());
        }
        out
    }

    fn expect_level(&self, level: Level, what: &str) -> Result<()> {
        if self.level == level {
            Ok(())
        } else {
            Err(NavError::InvalidTransition(format!(
                "cannot {what} from the {} level",
                self.level
            )))
        }
    }

    fn check_lock(&self, id: &str) -> Result<()> {
        match self.focused() {
            Some(focused) if focused != id => Err(NavError::InvalidTransition(format!(
                "{} {focused} is selected; release it first",
                self.level
            ))),
            _ => Ok(()),
        }
    }
}

fn unknown(kind: &str, id: &str) -> NavError {
    NavError::UnknownEntity(format!("{kind} {id}"))
}
