use rand::seq::SliceRandom;
use rand::Rng;

pub(crate) const FIRST_NAMES: &[&str] = &[
    "Awa", "Moussa", "Fatou", "Ibrahima", "Aminata", "Cheikh", "Mariama", "Ousmane", "Khady",
    "Mamadou", "Ndeye", "Abdoulaye", "Sokhna", "Babacar", "Aissatou", "Lamine", "Coumba", "Modou",
    "Binta", "Pape",
];

pub(crate) const LAST_NAMES: &[&str] = &[
    "Diop", "Ndiaye", "Fall", "Sow", "Ba", "Sy", "Diallo", "Gueye", "Faye", "Sarr", "Cissé",
    "Mbaye", "Kane", "Thiam", "Seck", "Diouf",
];

pub(crate) const CITIES: &[&str] = &[
    "Dakar", "Thiès", "Saint-Louis", "Ziguinchor", "Mbour", "Rufisque", "Kaolack", "Touba",
    "Saly", "Louga",
];

pub(crate) const STREETS: &[&str] = &[
    "Avenue Cheikh Anta Diop",
    "Rue Carnot",
    "Boulevard de la République",
    "Route de Ngor",
    "Corniche Ouest",
    "Rue Mohamed V",
    "Avenue Bourguiba",
    "Route des Almadies",
];

pub(crate) const PROPERTY_ADJECTIVES: &[&str] = &[
    "Bright", "Spacious", "Modern", "Renovated", "Quiet", "Furnished", "Sea view",
];

pub(crate) const PARTNER_NAMES: &[&str] = &[
    "Banque Atlantique", "Sonam Assurances", "Étude Maître Fall", "Teranga Immo",
    "Sahel Maintenance", "CBAO", "Allianz Sénégal", "Keur Services", "Baobab Notaires",
    "Dakar Facility",
];

pub(crate) const SERVICES: &[&str] = &[
    "Mortgage", "Home insurance", "Deed registration", "Property valuation", "Plumbing",
    "Electrical repairs", "Tenant screening", "Cleaning", "Legal advice",
];

pub(crate) const MESSAGE_BODIES: &[&str] = &[
    "Is the apartment still available for a visit this week?",
    "The water heater has stopped working since yesterday.",
    "Could you send me the signed lease agreement?",
    "I would like to know the conditions for the deposit.",
    "The rent for this month has been transferred.",
    "Your listing has been validated and is now online.",
    "The neighbours are making noise every night.",
    "Can we schedule the inventory of fixtures on Monday?",
];

pub(crate) const ADMIN_ACTIONS: &[&str] = &[
    "user.activate",
    "user.suspend",
    "user.role_change",
    "property.approve",
    "property.reject",
    "contract.terminate",
    "message.flag",
    "partner.create",
];

pub(crate) fn pick<'a, R: Rng + ?Sized>(rng: &mut R, pool: &[&'a str]) -> &'a str {
    pool.choose(rng).copied().unwrap_or_default()
}

pub(crate) fn pick_enum<T: Copy, R: Rng + ?Sized>(rng: &mut R, values: &[T]) -> T {
    values[rng.gen_range(0..values.len())]
}

pub(crate) fn slug(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            'é' | 'è' | 'É' => Some('e'),
            ' ' | '-' => Some('.'),
            _ => None,
        })
        .collect()
}

pub(crate) fn phone_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefix = pick(rng, &["70", "76", "77", "78"]);
    format!(
        "+221 {prefix} {:03} {:02} {:02}",
        rng.gen_range(0..1000),
        rng.gen_range(0..100),
        rng.gen_range(0..100)
    )
}

pub(crate) fn street_address<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{} {}", rng.gen_range(1..200), pick(rng, STREETS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_email_safe() {
        assert_eq!(slug("Cissé"), "cisse");
        assert_eq!(slug("Sea view"), "sea.view");
        assert_eq!(slug("Étude Maître"), "etude.matre");
    }
}
