use serde::{Deserialize, Serialize};

/// Direction of a wallet ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entrada,
    Salida,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Direction> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ENTRADA" | "IN" | "CREDIT" | "CREDITO" => Some(Direction::Entrada),
            "SALIDA" | "OUT" | "DEBIT" | "DEBITO" => Some(Direction::Salida),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entrada => "ENTRADA",
            Direction::Salida => "SALIDA",
        }
    }
}

/// Derived category of a wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletCategory {
    GananciaDropshipping,
    CobroFlete,
    Retiro,
    Recarga,
    EntradaOtro,
    SalidaOtro,
    Otro,
}

/// Ordered substring rules over the folded description; first match wins.
const CATEGORY_RULES: &[(&str, WalletCategory)] = &[
    ("ganancia de dropshipping", WalletCategory::GananciaDropshipping),
    ("ganancia dropshipping", WalletCategory::GananciaDropshipping),
    ("cobro de flete", WalletCategory::CobroFlete),
    ("flete inicial", WalletCategory::CobroFlete),
    ("retiro", WalletCategory::Retiro),
    ("recarga", WalletCategory::Recarga),
    ("deposito", WalletCategory::Recarga),
];

impl WalletCategory {
    /// Categorize a movement from its free-text description and direction.
    /// Total: anything unmatched falls back by direction, or to `Otro`
    /// when the direction itself is unknown.
    pub fn categorize(description: &str, direction: Option<Direction>) -> WalletCategory {
        let folded = fold_description(description);
        for (needle, category) in CATEGORY_RULES {
            if folded.contains(needle) {
                return *category;
            }
        }
        match direction {
            Some(Direction::Entrada) => WalletCategory::EntradaOtro,
            Some(Direction::Salida) => WalletCategory::SalidaOtro,
            None => WalletCategory::Otro,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletCategory::GananciaDropshipping => "ganancia_dropshipping",
            WalletCategory::CobroFlete => "cobro_flete",
            WalletCategory::Retiro => "retiro",
            WalletCategory::Recarga => "recarga",
            WalletCategory::EntradaOtro => "entrada_otro",
            WalletCategory::SalidaOtro => "salida_otro",
            WalletCategory::Otro => "otro",
        }
    }

    pub fn from_db(value: &str) -> WalletCategory {
        match value {
            "ganancia_dropshipping" => WalletCategory::GananciaDropshipping,
            "cobro_flete" => WalletCategory::CobroFlete,
            "retiro" => WalletCategory::Retiro,
            "recarga" => WalletCategory::Recarga,
            "entrada_otro" => WalletCategory::EntradaOtro,
            "salida_otro" => WalletCategory::SalidaOtro,
            _ => WalletCategory::Otro,
        }
    }
}

fn fold_description(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            _ => c.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profit_credit() {
        assert_eq!(
            WalletCategory::categorize(
                "Ganancia de Dropshipping orden #4821",
                Some(Direction::Entrada)
            ),
            WalletCategory::GananciaDropshipping
        );
    }

    #[test]
    fn test_freight_charge() {
        assert_eq!(
            WalletCategory::categorize("Cobro de flete inicial orden 4821", Some(Direction::Salida)),
            WalletCategory::CobroFlete
        );
    }

    #[test]
    fn test_first_match_wins() {
        // Mentions both a recharge and a withdrawal; "retiro" is ranked first.
        assert_eq!(
            WalletCategory::categorize("Retiro de recarga", Some(Direction::Salida)),
            WalletCategory::Retiro
        );
    }

    #[test]
    fn test_diacritics_folded() {
        assert_eq!(
            WalletCategory::categorize("DEPÓSITO bancario", Some(Direction::Entrada)),
            WalletCategory::Recarga
        );
    }

    #[test]
    fn test_direction_fallback() {
        assert_eq!(
            WalletCategory::categorize("ajuste manual", Some(Direction::Entrada)),
            WalletCategory::EntradaOtro
        );
        assert_eq!(
            WalletCategory::categorize("ajuste manual", Some(Direction::Salida)),
            WalletCategory::SalidaOtro
        );
        assert_eq!(
            WalletCategory::categorize("ajuste manual", None),
            WalletCategory::Otro
        );
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("ENTRADA"), Some(Direction::Entrada));
        assert_eq!(Direction::parse("salida"), Some(Direction::Salida));
        assert_eq!(Direction::parse("credit"), Some(Direction::Entrada));
        assert_eq!(Direction::parse("???"), None);
    }
}
