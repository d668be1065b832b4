//! An approach pairs a checking technique with a scheduling strategy.
use crate::checker::Technique;
use crate::scheduler::Strategy;
use crate::Error;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Approach {
    pub technique: Technique,
    pub strategy: Strategy,
}

impl Approach {
    /// BASE + IMD.
    pub const INFUSE_BASE: Approach = Approach::new(Technique::Base, Strategy::Imd);
    /// INFUSE_C + INFUSE_S.
    pub const INFUSE: Approach = Approach::new(Technique::InfuseC, Strategy::InfuseS);

    #[must_use]
    pub const fn new(technique: Technique, strategy: Strategy) -> Self {
        Self {
            technique,
            strategy,
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.technique, self.strategy)
    }
}

impl FromStr for Approach {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Error> {
        match name {
            "INFUSE_base" => return Ok(Approach::INFUSE_BASE),
            "INFUSE" => return Ok(Approach::INFUSE),
            _ => {}
        }

        let unknown = || Error::UnknownApproach(name.into());
        let (technique, strategy) = name.split_once('+').ok_or_else(unknown)?;
        Ok(Approach::new(
            technique.parse().map_err(|_| unknown())?,
            strategy.parse().map_err(|_| unknown())?,
        ))
    }
}

#[test]
fn test_parse_approaches() {
    assert_eq!(
        "PCC+GEAS_ori".parse::<Approach>(),
        Ok(Approach::new(Technique::Pcc, Strategy::GeasOri))
    );
    assert_eq!("INFUSE".parse::<Approach>(), Ok(Approach::INFUSE));
    assert_eq!(
        "INFUSE_base".parse::<Approach>(),
        Ok(Approach::new(Technique::Base, Strategy::Imd))
    );
    assert_eq!(Approach::INFUSE.to_string(), "INFUSE_C+INFUSE_S");

    for technique in Technique::ALL.iter() {
        for strategy in Strategy::ALL.iter() {
            let approach = Approach::new(*technique, *strategy);
            assert_eq!(approach.to_string().parse::<Approach>(), Ok(approach));
        }
    }
}

#[test]
fn test_unknown_approaches() {
    for name in ["", "ECC", "ECC+", "+IMD", "ECC+IMD+IMD", "ecc+imd", "INFUSE_C"].iter() {
        assert_eq!(
            name.parse::<Approach>(),
            Err(Error::UnknownApproach((*name).into()))
        );
    }
}
