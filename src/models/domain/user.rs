/// Directory entry used to label attempts in the owner's review views.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
}

impl UserInfo {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string();
        if name.is_empty() {
            format!("User #{}", self.id)
        } else {
            name
        }
    }
}
