//! Raw form state and its validation into typed requests.
//!
//! Nothing in here touches the network. A form either becomes a request object
//! or a `Validation` error that describes what to fix.

use crate::address::{parse_whitelist, validate_whitelist};
use crate::error::AppError;
use crate::pool::{parse_instant, CreatePoolRequest, PoolPassword, PoolUpdate};

/// Fields of the create-pool form, exactly as entered.
#[derive(Debug, Clone, Default)]
pub struct CreatePoolForm {
    pub name: String,
    pub password: String,
    pub password_confirm: String,
    pub start_time: String,
    pub end_time: String,
    pub usage_cap: String,
    pub whitelist: String,
    pub sponsor_info: String,
}

impl CreatePoolForm {
    pub fn validate(&self, creator_address: &str) -> Result<CreatePoolRequest, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Pool name is required.".into()));
        }

        let password = PoolPassword::new(self.password.clone())
            .ok_or_else(|| AppError::Validation("Pool password is required.".into()))?;
        if self.password != self.password_confirm {
            return Err(AppError::Validation("Passwords do not match.".into()));
        }

        let whitelist = parse_whitelist(&self.whitelist);
        validate_whitelist(&whitelist)?;

        let start_time = parse_instant(&self.start_time)?;
        let end_time = parse_instant(&self.end_time)?;
        if start_time >= end_time {
            return Err(AppError::Validation(
                "Start time must be before end time.".into(),
            ));
        }

        let usage_cap = parse_usage_cap(&self.usage_cap)?;

        Ok(CreatePoolRequest {
            name: name.to_string(),
            password,
            start_time,
            end_time,
            usage_cap,
            whitelist,
            creator_address: creator_address.to_string(),
            sponsor_info: self.sponsor_info.trim().to_string(),
        })
    }
}

/// Fields of the edit form. `None` means the field was left out.
#[derive(Debug, Clone, Default)]
pub struct EditPoolForm {
    pub password: String,
    pub name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub usage_cap: Option<String>,
    pub whitelist: Option<String>,
    pub sponsor_info: Option<String>,
}

impl EditPoolForm {
    pub fn validate(&self) -> Result<(PoolPassword, PoolUpdate), AppError> {
        let password = PoolPassword::new(self.password.clone())
            .ok_or_else(|| AppError::Validation("Pool password is required to edit.".into()))?;

        let whitelist = match non_blank(&self.whitelist) {
            Some(text) => {
                let list = parse_whitelist(text);
                validate_whitelist(&list)?;
                Some(list)
            }
            None => None,
        };

        let start_time = non_blank(&self.start_time).map(parse_instant).transpose()?;
        let end_time = non_blank(&self.end_time).map(parse_instant).transpose()?;
        // ordering can only be checked when both ends are known
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start >= end {
                return Err(AppError::Validation(
                    "Start time must be before end time.".into(),
                ));
            }
        }

        let usage_cap = non_blank(&self.usage_cap).map(parse_usage_cap).transpose()?;

        let update = PoolUpdate {
            name: non_blank(&self.name).map(|s| s.trim().to_string()),
            start_time,
            end_time,
            usage_cap,
            whitelist,
            sponsor_info: self.sponsor_info.as_ref().map(|s| s.trim().to_string()),
        };

        if update.is_empty() {
            return Err(AppError::Validation("Nothing to update.".into()));
        }
        Ok((password, update))
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

fn parse_usage_cap(raw: &str) -> Result<f64, AppError> {
    let cap: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("Usage cap must be a number, got '{raw}'")))?;
    if !cap.is_finite() || cap < 0.0 {
        return Err(AppError::Validation(
            "Usage cap must be a non-negative number.".into(),
        ));
    }
    Ok(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::addr;

    fn valid_create_form() -> CreatePoolForm {
        CreatePoolForm {
            name: "Hackathon".into(),
            password: "s3cret".into(),
            password_confirm: "s3cret".into(),
            start_time: "2026-05-01T00:00:00Z".into(),
            end_time: "2026-06-01T00:00:00Z".into(),
            usage_cap: "10".into(),
            whitelist: format!("{}\n{}", addr("A"), addr("B")),
            sponsor_info: " Sponsored by us ".into(),
        }
    }

    #[test]
    fn create_form_builds_request() {
        let req = valid_create_form().validate("creator").unwrap();
        assert_eq!(req.name, "Hackathon");
        assert_eq!(req.usage_cap, 10.0);
        assert_eq!(req.whitelist.len(), 2);
        assert_eq!(req.creator_address, "creator");
        assert_eq!(req.sponsor_info, "Sponsored by us");
    }

    #[test]
    fn create_rejects_start_not_before_end() {
        let mut form = valid_create_form();
        form.end_time = form.start_time.clone();
        let err = form.validate("creator").unwrap_err();
        assert_eq!(err.to_string(), "Start time must be before end time.");

        form.end_time = "2026-04-01T00:00:00Z".into();
        assert!(form.validate("creator").is_err());
    }

    #[test]
    fn create_rejects_password_mismatch_and_missing() {
        let mut form = valid_create_form();
        form.password_confirm = "other".into();
        assert_eq!(
            form.validate("c").unwrap_err().to_string(),
            "Passwords do not match."
        );

        form.password = String::new();
        assert_eq!(
            form.validate("c").unwrap_err().to_string(),
            "Pool password is required."
        );
    }

    #[test]
    fn create_rejects_bad_usage_cap() {
        for cap in ["-1", "abc", "inf", "NaN"] {
            let mut form = valid_create_form();
            form.usage_cap = cap.into();
            assert!(form.validate("c").is_err(), "cap {cap} should be rejected");
        }
    }

    #[test]
    fn create_rejects_invalid_whitelist_entry() {
        let mut form = valid_create_form();
        form.whitelist.push_str("\nnot-an-address");
        let err = form.validate("c").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please fix invalid addresses: not-an-address"
        );
    }

    #[test]
    fn edit_with_only_usage_cap_is_sparse() {
        let form = EditPoolForm {
            password: "pw".into(),
            usage_cap: Some("42".into()),
            ..Default::default()
        };
        let (_, update) = form.validate().unwrap();
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({ "usageCap": 42.0 })
        );
    }

    #[test]
    fn edit_skips_ordering_check_with_one_end() {
        let form = EditPoolForm {
            password: "pw".into(),
            end_time: Some("2020-01-01T00:00:00Z".into()),
            ..Default::default()
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn edit_checks_ordering_with_both_ends() {
        let form = EditPoolForm {
            password: "pw".into(),
            start_time: Some("2026-02-01T00:00:00Z".into()),
            end_time: Some("2026-01-01T00:00:00Z".into()),
            ..Default::default()
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn edit_requires_password_and_some_change() {
        let form = EditPoolForm {
            usage_cap: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Pool password is required to edit."
        );

        let empty = EditPoolForm {
            password: "pw".into(),
            start_time: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(empty.validate().unwrap_err().to_string(), "Nothing to update.");
    }
}
