//! Contact to Laske party mapping.

use super::sales_order::Party;
use crate::core::Contact;

pub const NAME_SLOT_LEN: usize = 35;
const NAME_SLOTS: usize = 4;

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Split a name into at most four 35-character slots.
///
/// Chunks after the first that are a single character long are dropped. A
/// care-of line `c/o X` goes into the next free slot, or replaces the last
/// slot when all four are taken.
pub fn split_name(name: &str, care_of: Option<&str>) -> [Option<String>; 4] {
    let chars: Vec<char> = name.chars().collect();
    let mut slots: Vec<String> = chars
        .chunks(NAME_SLOT_LEN)
        .enumerate()
        .filter(|(i, chunk)| *i == 0 || chunk.len() > 1)
        .map(|(_, chunk)| chunk.iter().collect::<String>())
        .take(NAME_SLOTS)
        .collect();

    if let Some(care_of) = care_of.map(str::trim).filter(|c| !c.is_empty()) {
        let line = truncate(&format!("c/o {care_of}"), NAME_SLOT_LEN);
        if slots.len() < NAME_SLOTS {
            slots.push(line);
        } else {
            slots[NAME_SLOTS - 1] = line;
        }
    }

    let mut out: [Option<String>; 4] = Default::default();
    for (slot, value) in out.iter_mut().zip(slots) {
        *slot = Some(value);
    }
    out
}

/// Build a Laske party from a contact.
///
/// Persons are identified by national identification number, everyone else
/// by business id. Name and address are written to both the priority and
/// the info slots.
pub fn party_from_contact(contact: &Contact) -> Party {
    let (customer_id, customer_yid) = if contact.is_person() {
        (non_empty(&contact.national_identification_number).map(String::from), None)
    } else {
        (None, non_empty(&contact.business_id).map(String::from))
    };
    let names = split_name(&contact.display_name(), non_empty(&contact.care_of));
    let address = non_empty(&contact.address).map(|a| truncate(a, NAME_SLOT_LEN));
    let city = non_empty(&contact.city).map(|c| truncate(c, NAME_SLOT_LEN));
    let postal_code = non_empty(&contact.postal_code).map(String::from);
    let ovt = non_empty(&contact.electronic_billing_address).map(String::from);

    Party {
        sap_customer_id: non_empty(&contact.sap_customer_number).map(String::from),
        customer_id: customer_id.clone(),
        customer_yid: customer_yid.clone(),
        customer_ovt: ovt.clone(),
        priority_name: names.clone(),
        priority_address1: address.clone(),
        priority_city: city.clone(),
        priority_postalcode: postal_code.clone(),
        info_customer_id: customer_id,
        info_customer_yid: customer_yid,
        info_customer_ovt: ovt,
        info_name: names,
        info_address1: address,
        info_city: city,
        info_postalcode: postal_code,
        ..Party::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ContactType;

    #[test]
    fn short_name_uses_one_slot() {
        let slots = split_name("Maija Meikäläinen", None);
        assert_eq!(slots[0].as_deref(), Some("Maija Meikäläinen"));
        assert!(slots[1].is_none());
    }

    #[test]
    fn long_name_is_chunked_and_singletons_dropped() {
        let name = format!("{}{}", "a".repeat(35), "b");
        let slots = split_name(&name, None);
        assert_eq!(slots[0].as_deref(), Some("a".repeat(35).as_str()));
        assert!(slots[1].is_none());

        let name = format!("{}{}", "a".repeat(35), "bc");
        assert_eq!(split_name(&name, None)[1].as_deref(), Some("bc"));
    }

    #[test]
    fn care_of_takes_next_slot_or_the_last() {
        let slots = split_name("Asunto Oy Esimerkki", Some("Isännöinti Oy"));
        assert_eq!(slots[1].as_deref(), Some("c/o Isännöinti Oy"));

        let full = "x".repeat(140);
        let slots = split_name(&full, Some("Y"));
        assert_eq!(slots[3].as_deref(), Some("c/o Y"));
        assert_eq!(slots[2].as_deref(), Some("x".repeat(35).as_str()));
    }

    #[test]
    fn person_and_business_ids() {
        let mut person = Contact::person(1, "Maija", "Meikäläinen");
        person.national_identification_number = Some("010101-123A".into());
        person.business_id = Some("1234567-8".into());
        let party = party_from_contact(&person);
        assert_eq!(party.customer_id.as_deref(), Some("010101-123A"));
        assert_eq!(party.customer_yid, None);
        assert_eq!(party.info_customer_id.as_deref(), Some("010101-123A"));

        let mut business = Contact::business(2, "Yritys Oy", "1234567-8");
        business.address = Some("Katu 1".into());
        business.postal_code = Some("00100".into());
        business.city = Some("Helsinki".into());
        let party = party_from_contact(&business);
        assert_eq!(business.contact_type, ContactType::Business);
        assert_eq!(party.customer_yid.as_deref(), Some("1234567-8"));
        assert_eq!(party.priority_address1.as_deref(), Some("Katu 1"));
        assert_eq!(party.info_postalcode.as_deref(), Some("00100"));
    }
}
