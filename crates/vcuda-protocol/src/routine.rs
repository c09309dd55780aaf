use std::fmt;

/// Identifier of a virtualized registration routine, as sent in a request frame.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoutineId {
    RegisterModule = 1,
    UnregisterModule = 2,
    RegisterFunction = 3,
    RegisterVariable = 4,
    RegisterSharedVariable = 5,
    RegisterShared = 6,
    RegisterTexture = 7,
}

impl RoutineId {
    pub const ALL: [RoutineId; 7] = [
        RoutineId::RegisterModule,
        RoutineId::UnregisterModule,
        RoutineId::RegisterFunction,
        RoutineId::RegisterVariable,
        RoutineId::RegisterSharedVariable,
        RoutineId::RegisterShared,
        RoutineId::RegisterTexture,
    ];

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            RoutineId::RegisterModule => "RegisterModule",
            RoutineId::UnregisterModule => "UnregisterModule",
            RoutineId::RegisterFunction => "RegisterFunction",
            RoutineId::RegisterVariable => "RegisterVariable",
            RoutineId::RegisterSharedVariable => "RegisterSharedVariable",
            RoutineId::RegisterShared => "RegisterShared",
            RoutineId::RegisterTexture => "RegisterTexture",
        }
    }
}

impl TryFrom<u32> for RoutineId {
    /// The unrecognised identifier.
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        RoutineId::ALL
            .into_iter()
            .find(|r| r.as_u32() == value)
            .ok_or(value)
    }
}

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
