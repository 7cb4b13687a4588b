//! Shared value types: timestamps and acting users
use super::error::{EngineError, ValidationError};
use chrono::{DateTime, Utc};

/// Highest organizational tier that can act on a transaction (treasurer).
pub const MAX_ACTOR_LEVEL: u8 = 4;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// The user performing an action, as resolved by the session layer.
///
/// Level 0 is a plain submitter; levels 1 to 4 are the section, office, zone
/// and treasurer approval tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    id: String,
    level: u8,
}

impl Actor {
    pub fn new(id: impl Into<String>, level: u8) -> Result<Self, EngineError> {
        if level > MAX_ACTOR_LEVEL {
            return Err(ValidationError::InvalidActorLevel(level).into());
        }
        Ok(Self {
            id: id.into(),
            level,
        })
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn level(&self) -> u8 {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
        assert!(decode.to_datetime_utc() <= Utc::now());
    }

    #[test]
    fn actor_level_is_bounded() {
        assert!(Actor::new("treasurer", 4).is_ok());
        assert!(matches!(
            Actor::new("nobody", 5),
            Err(EngineError::Validation(ValidationError::InvalidActorLevel(5)))
        ));
    }
}
