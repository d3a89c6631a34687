/// Entity and task kind definitions
///
/// An [`EntityKind`] names one of the three archived document types and owns
/// its on-disk namespace. A [`TaskKind`] additionally covers the catalog
/// discovery page, which is fetched but never archived.
use std::fmt;

/// One of the archived document types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// A semester/faculty/major course listing, keyed by category id
    Semester,

    /// A course enrolment page, keyed by course id
    Course,

    /// A user profile page, keyed by user id
    User,
}

impl EntityKind {
    /// Directory name of this kind's namespace under the output directory
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Semester => "semesters",
            Self::Course => "courses",
            Self::User => "users",
        }
    }

    /// Parses a kind from its namespace directory name
    pub fn from_namespace(s: &str) -> Option<Self> {
        match s {
            "semesters" => Some(Self::Semester),
            "courses" => Some(Self::Course),
            "users" => Some(Self::User),
            _ => None,
        }
    }

    /// Returns all entity kinds
    pub fn all() -> [Self; 3] {
        [Self::Semester, Self::Course, Self::User]
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Semester => "semester",
            Self::Course => "course",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of a unit of frontier work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// The catalog page listing every course category; discovery only
    Catalog,

    /// An archived entity page
    Entity(EntityKind),
}

impl TaskKind {
    pub const SEMESTER: Self = Self::Entity(EntityKind::Semester);
    pub const COURSE: Self = Self::Entity(EntityKind::Course);
    pub const USER: Self = Self::Entity(EntityKind::User);

    /// Returns the archived kind, or None for the catalog page
    pub fn entity(&self) -> Option<EntityKind> {
        match self {
            Self::Catalog => None,
            Self::Entity(kind) => Some(*kind),
        }
    }
}

impl From<EntityKind> for TaskKind {
    fn from(kind: EntityKind) -> Self {
        Self::Entity(kind)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => f.write_str("catalog"),
            Self::Entity(kind) => kind.fmt(f),
        }
    }
}
