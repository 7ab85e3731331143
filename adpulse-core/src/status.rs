use serde::{Deserialize, Serialize};

/// Normalized order status vocabulary.
///
/// The fulfillment platform reports statuses as free text (mixed case,
/// diacritics, courier-specific wording); everything downstream works on
/// this fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Entregado,
    Devolucion,
    Cancelado,
    PendienteConfirmacion,
    EnRuta,
    Desconocido,
}

/// Known raw statuses, matched after trimming, uppercasing and stripping
/// diacritics.
const STATUS_MAP: &[(&str, OrderStatus)] = &[
    ("ENTREGADO", OrderStatus::Entregado),
    ("ENTREGADA", OrderStatus::Entregado),
    ("FINALIZADO", OrderStatus::Entregado),
    ("DEVOLUCION", OrderStatus::Devolucion),
    ("DEVUELTO", OrderStatus::Devolucion),
    ("EN DEVOLUCION", OrderStatus::Devolucion),
    ("RETORNADO", OrderStatus::Devolucion),
    ("CANCELADO", OrderStatus::Cancelado),
    ("CANCELADA", OrderStatus::Cancelado),
    ("ANULADO", OrderStatus::Cancelado),
    ("RECHAZADO", OrderStatus::Cancelado),
    ("PENDIENTE", OrderStatus::PendienteConfirmacion),
    ("PENDIENTE CONFIRMACION", OrderStatus::PendienteConfirmacion),
    ("POR CONFIRMAR", OrderStatus::PendienteConfirmacion),
    ("EN RUTA", OrderStatus::EnRuta),
    ("ENVIADO", OrderStatus::EnRuta),
    ("DESPACHADO", OrderStatus::EnRuta),
    ("EN TRANSITO", OrderStatus::EnRuta),
    ("EN REPARTO", OrderStatus::EnRuta),
    ("EN AGENCIA", OrderStatus::EnRuta),
    ("EN OFICINA", OrderStatus::EnRuta),
    ("GUIA GENERADA", OrderStatus::EnRuta),
    ("GUIA_GENERADA", OrderStatus::EnRuta),
    ("EN PROCESAMIENTO", OrderStatus::EnRuta),
    ("TELEMERCADEO", OrderStatus::EnRuta),
    ("NOVEDAD", OrderStatus::EnRuta),
    ("INTENTO DE ENTREGA", OrderStatus::EnRuta),
    ("REEXPEDICION", OrderStatus::EnRuta),
];

impl OrderStatus {
    /// Normalize a raw status string. Total: unknown non-empty input is
    /// treated as still in transit, empty input as unknown.
    pub fn normalize(raw: &str) -> OrderStatus {
        let key = fold_status_key(raw);
        if key.is_empty() {
            return OrderStatus::Desconocido;
        }
        STATUS_MAP
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, status)| *status)
            .unwrap_or(OrderStatus::EnRuta)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Entregado => "ENTREGADO",
            OrderStatus::Devolucion => "DEVOLUCION",
            OrderStatus::Cancelado => "CANCELADO",
            OrderStatus::PendienteConfirmacion => "PENDIENTE_CONFIRMACION",
            OrderStatus::EnRuta => "EN_RUTA",
            OrderStatus::Desconocido => "DESCONOCIDO",
        }
    }

    /// Parse the stored (already normalized) form back from the database.
    pub fn from_db(value: &str) -> OrderStatus {
        match value {
            "ENTREGADO" => OrderStatus::Entregado,
            "DEVOLUCION" => OrderStatus::Devolucion,
            "CANCELADO" => OrderStatus::Cancelado,
            "PENDIENTE_CONFIRMACION" => OrderStatus::PendienteConfirmacion,
            "EN_RUTA" => OrderStatus::EnRuta,
            _ => OrderStatus::Desconocido,
        }
    }
}

/// Uppercase, trim, strip Spanish diacritics and collapse whitespace runs.
fn fold_status_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = true;
    for c in raw.trim().chars() {
        let c = match c {
            'á' | 'Á' => 'A',
            'é' | 'É' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'Ó' => 'O',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'U',
            'ñ' | 'Ñ' => 'N',
            _ => c.to_ascii_uppercase(),
        };
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_statuses_normalize() {
        for (raw, expected) in STATUS_MAP {
            assert_eq!(OrderStatus::normalize(raw), *expected, "raw: {}", raw);
        }
    }

    #[test]
    fn test_case_and_diacritics_folded() {
        assert_eq!(OrderStatus::normalize("entregado"), OrderStatus::Entregado);
        assert_eq!(OrderStatus::normalize("Devolución"), OrderStatus::Devolucion);
        assert_eq!(OrderStatus::normalize("  en  tránsito "), OrderStatus::EnRuta);
        assert_eq!(OrderStatus::normalize("GUÍA GENERADA"), OrderStatus::EnRuta);
    }

    #[test]
    fn test_unknown_non_empty_defaults_to_en_ruta() {
        assert_eq!(OrderStatus::normalize("EN CENTRO DE ACOPIO"), OrderStatus::EnRuta);
        assert_eq!(OrderStatus::normalize("whatever"), OrderStatus::EnRuta);
    }

    #[test]
    fn test_empty_is_desconocido() {
        assert_eq!(OrderStatus::normalize(""), OrderStatus::Desconocido);
        assert_eq!(OrderStatus::normalize("   "), OrderStatus::Desconocido);
    }

    #[test]
    fn test_db_round_trip() {
        for status in [
            OrderStatus::Entregado,
            OrderStatus::Devolucion,
            OrderStatus::Cancelado,
            OrderStatus::PendienteConfirmacion,
            OrderStatus::EnRuta,
            OrderStatus::Desconocido,
        ] {
            assert_eq!(OrderStatus::from_db(status.as_str()), status);
        }
    }
}
