//! Unit categories and the unit strings that belong to them.
//!
//! Membership is checked on the unit string only; no dimensional analysis is
//! done. Units of a prefixable base may carry one SI prefix (`mm`, `keV`).
use fxhash::FxHashMap;

const SI_PREFIXES: [&str; 20] = [
    "Y", "Z", "E", "P", "T", "G", "M", "k", "h", "da", "d", "c", "m", "u", "µ", "μ", "n", "p", "f",
    "a",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitCheck {
    Member,
    NotMember,
    /// Categories without a table entry accept any unit
    UnknownCategory,
}

#[derive(Debug, Clone)]
struct Base {
    symbol: &'static str,
    prefixable: bool,
}

#[derive(Debug, Clone)]
pub struct UnitTable {
    categories: FxHashMap<&'static str, Vec<Base>>,
}

fn si(symbols: &[&'static str]) -> Vec<Base> {
    symbols
        .iter()
        .map(|&symbol| Base {
            symbol,
            prefixable: true,
        })
        .collect()
}

fn plain(symbols: &[&'static str]) -> Vec<Base> {
    symbols
        .iter()
        .map(|&symbol| Base {
            symbol,
            prefixable: false,
        })
        .collect()
}

impl Default for UnitTable {
    fn default() -> Self {
        let mut categories: FxHashMap<&'static str, Vec<Base>> = FxHashMap::default();
        let mut add = |category: &'static str, mut prefixed: Vec<Base>, other: Vec<Base>| {
            prefixed.extend(other);
            categories.insert(category, prefixed);
        };
        add(
            "NX_LENGTH",
            si(&["m"]),
            plain(&["angstrom", "Å", "Angstrom", "inch", "in", "ft"]),
        );
        add(
            "NX_WAVELENGTH",
            si(&["m"]),
            plain(&["angstrom", "Å", "Angstrom"]),
        );
        add("NX_AREA", si(&["m^2", "m2", "b", "barn"]), plain(&[]));
        add("NX_VOLUME", si(&["m^3", "m3", "l", "L"]), plain(&[]));
        add(
            "NX_ANGLE",
            si(&["rad"]),
            plain(&["deg", "degree", "degrees", "°", "arcmin", "arcsec"]),
        );
        add("NX_TIME", si(&["s"]), plain(&["min", "h", "hour", "d", "day"]));
        add("NX_PERIOD", si(&["s"]), plain(&["min", "h"]));
        add("NX_FREQUENCY", si(&["Hz"]), plain(&["1/s", "s^-1"]));
        add("NX_ENERGY", si(&["eV", "J"]), plain(&["Ry", "Ha", "cm^-1", "1/cm"]));
        add(
            "NX_TEMPERATURE",
            si(&["K"]),
            plain(&["C", "°C", "degC", "celsius", "F", "°F", "degF"]),
        );
        add("NX_MASS", si(&["g"]), plain(&["u", "Da", "amu"]));
        add("NX_CURRENT", si(&["A"]), plain(&[]));
        add("NX_VOLTAGE", si(&["V"]), plain(&[]));
        add("NX_CHARGE", si(&["C"]), plain(&["e"]));
        add("NX_POWER", si(&["W"]), plain(&["dBm"]));
        add(
            "NX_PRESSURE",
            si(&["Pa", "bar"]),
            plain(&["Torr", "torr", "mTorr", "atm", "psi"]),
        );
        add("NX_MAGNETIC_FIELD", si(&["T", "G", "Oe"]), plain(&[]));
        add("NX_ELECTRIC_FIELD", si(&["V/m"]), plain(&[]));
        add(
            "NX_PER_LENGTH",
            plain(&[]),
            plain(&["1/m", "m^-1", "1/cm", "cm^-1", "1/nm", "nm^-1", "1/angstrom", "1/Å"]),
        );
        add(
            "NX_WAVENUMBER",
            plain(&[]),
            plain(&["1/m", "m^-1", "1/cm", "cm^-1", "1/nm", "nm^-1", "1/angstrom", "1/Å"]),
        );
        add("NX_COUNT", plain(&[]), plain(&["", "1", "counts", "count", "cts"]));
        add("NX_DIMENSIONLESS", plain(&[]), plain(&["", "1", "%"]));
        Self { categories }
    }
}

impl UnitTable {
    /// Check that a unit string belongs to a unit category
    pub fn check(&self, category: &str, unit: &str) -> UnitCheck {
        let Some(bases) = self.categories.get(category) else {
            return UnitCheck::UnknownCategory;
        };
        let unit = unit.trim();
        let member = bases.iter().any(|base| {
            base.symbol == unit
                || (base.prefixable
                    && SI_PREFIXES
                        .iter()
                        .any(|p| unit.strip_prefix(p) == Some(base.symbol)))
        });
        if member {
            UnitCheck::Member
        } else {
            UnitCheck::NotMember
        }
    }

    pub fn knows(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let table = UnitTable::default();
        assert_eq!(table.check("NX_LENGTH", "mm"), UnitCheck::Member);
        assert_eq!(table.check("NX_LENGTH", "angstrom"), UnitCheck::Member);
        assert_eq!(table.check("NX_ENERGY", "keV"), UnitCheck::Member);
        assert_eq!(table.check("NX_TEMPERATURE", "K"), UnitCheck::Member);
        assert_eq!(table.check("NX_TEMPERATURE", "eV"), UnitCheck::NotMember);
        assert_eq!(table.check("NX_ANGLE", "mdeg"), UnitCheck::NotMember);
        assert_eq!(table.check("NX_ANY", "whatever"), UnitCheck::UnknownCategory);
    }
}
