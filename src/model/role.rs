#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Admin = 1,
    Member = 2,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Member),
            _ => None,
        }
    }

    pub fn for_user(is_admin: bool) -> Self {
        if is_admin { Role::Admin } else { Role::Member }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}
