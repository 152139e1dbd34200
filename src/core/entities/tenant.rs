use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ContactId, IntendedUseId, TenantContactId, TenantId};
use crate::core::date_range::Span;
use crate::core::error::ValidationError;
use crate::core::shares::Fraction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantContactRole {
    Tenant,
    Billing,
    Contact,
}

/// One contact's role on a tenant over a period of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantContact {
    pub id: TenantContactId,
    pub contact: ContactId,
    pub role: TenantContactRole,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub deleted: bool,
}

impl TenantContact {
    pub fn new(
        id: TenantContactId,
        contact: ContactId,
        role: TenantContactRole,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            contact,
            role,
            start_date,
            end_date,
            deleted: false,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// Tenant's share of the rent of a single intended use, replacing the
/// tenant's lease share for that intended use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRentShare {
    pub intended_use: IntendedUseId,
    pub share_numerator: u32,
    pub share_denominator: u32,
}

/// A share of a lease held by one or more contacts over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub share_numerator: u32,
    pub share_denominator: u32,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub contacts: Vec<TenantContact>,
    #[serde(default)]
    pub rent_shares: Vec<TenantRentShare>,
    #[serde(default)]
    pub deleted: bool,
}

impl Tenant {
    pub fn new(id: TenantId, share_numerator: u32, share_denominator: u32) -> Self {
        Self {
            id,
            share_numerator,
            share_denominator,
            reference: None,
            contacts: Vec::new(),
            rent_shares: Vec::new(),
            deleted: false,
        }
    }

    pub fn with_contact(mut self, contact: TenantContact) -> Self {
        self.contacts.push(contact);
        self
    }

    pub fn share(&self) -> Fraction {
        Fraction::new(
            i128::from(self.share_numerator),
            i128::from(self.share_denominator),
        )
    }

    /// Share of the rent for `intended_use`, honouring a matching rent share.
    pub fn share_for(&self, intended_use: Option<IntendedUseId>) -> Fraction {
        intended_use
            .and_then(|use_id| self.rent_shares.iter().find(|s| s.intended_use == use_id))
            .map(|s| {
                Fraction::new(
                    i128::from(s.share_numerator),
                    i128::from(s.share_denominator),
                )
            })
            .unwrap_or_else(|| self.share())
    }

    pub fn contacts_with_role(
        &self,
        role: TenantContactRole,
    ) -> impl Iterator<Item = &TenantContact> {
        self.contacts
            .iter()
            .filter(move |c| !c.deleted && c.role == role)
    }

    pub fn active_contact(
        &self,
        role: TenantContactRole,
        date: NaiveDate,
    ) -> Option<&TenantContact> {
        self.contacts_with_role(role).find(|c| c.span().contains(date))
    }

    /// The contact invoices are addressed to on `date`: BILLING before TENANT.
    pub fn billed_contact(&self, date: NaiveDate) -> Option<ContactId> {
        self.active_contact(TenantContactRole::Billing, date)
            .or_else(|| self.active_contact(TenantContactRole::Tenant, date))
            .map(|c| c.contact)
    }

    pub fn is_member_at(&self, date: NaiveDate) -> bool {
        !self.deleted && self.active_contact(TenantContactRole::Tenant, date).is_some()
    }

    /// Share sanity plus the one-active-contact-per-role rule for TENANT and
    /// BILLING roles.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let field = format!("tenants[{}]", self.id);
        if self.share_denominator == 0 {
            errors.push(ValidationError::new(
                format!("{field}.share_denominator"),
                "must be greater than zero",
            ));
        } else if self.share_numerator > self.share_denominator {
            errors.push(ValidationError::new(
                format!("{field}.share_numerator"),
                "must not exceed the denominator",
            ));
        }
        for share in &self.rent_shares {
            if share.share_denominator == 0 {
                errors.push(ValidationError::new(
                    format!("{field}.rent_shares[{}]", share.intended_use),
                    "share denominator must be greater than zero",
                ));
            }
        }
        for role in [TenantContactRole::Tenant, TenantContactRole::Billing] {
            let contacts: Vec<&TenantContact> = self.contacts_with_role(role).collect();
            for (i, a) in contacts.iter().enumerate() {
                for b in &contacts[i + 1..] {
                    if a.span().overlap(&b.span()).is_some() {
                        errors.push(ValidationError::new(
                            format!("{field}.contacts"),
                            format!(
                                "contacts {} and {} overlap in role {role:?}",
                                a.id, b.id
                            ),
                        ));
                    }
                }
            }
        }
        errors
    }
}
