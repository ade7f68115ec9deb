//! Encoding of flight outcomes for delivery to other nodes.

use arraylink_types::OperationKey;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::FlightError;

pub(crate) fn encode_outcome<V, E>(key: &OperationKey, outcome: &Result<V, E>) -> Result<Vec<u8>, FlightError>
where
    V: Serialize,
    E: Serialize,
{
    postcard::to_allocvec(outcome).map_err(|e| FlightError::Codec {
        key: key.clone(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode_outcome<V, E>(key: &OperationKey, bytes: &[u8]) -> Result<V, E>
where
    V: DeserializeOwned,
    E: DeserializeOwned + From<FlightError>,
{
    match postcard::from_bytes::<Result<V, E>>(bytes) {
        Ok(outcome) => outcome,
        Err(e) => Err(FlightError::Codec {
            key: key.clone(),
            reason: e.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_crosses_nodes_intact() {
        let key = OperationKey::new("op", "owner");
        let outcome: Result<String, FlightError> = Err(FlightError::Abandoned(key.clone()));

        let bytes = encode_outcome(&key, &outcome).unwrap();
        let decoded: Result<String, FlightError> = decode_outcome(&key, &bytes);

        assert_eq!(decoded, outcome);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let key = OperationKey::new("op", "owner");
        let decoded: Result<String, FlightError> = decode_outcome(&key, &[0xff, 0xff, 0xff]);

        assert!(matches!(decoded, Err(FlightError::Codec { .. })));
    }
}
