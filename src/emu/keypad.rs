use crate::u4;

/// Host key label for each logical key 0x0-0xF.
pub const KEY_LABELS: [char; 16] = [
    'X', '1', '2', '3', // 0x0 - 0x3
    'Q', 'W', 'E', 'A', // 0x4 - 0x7
    'S', 'D', 'Y', 'C', // 0x8 - 0xB
    '4', 'R', 'F', 'V', // 0xC - 0xF
];

/// Logical key for a host key label, case-insensitive.
pub fn key_for_label(label: char) -> Option<u4> {
    let label = label.to_ascii_uppercase();
    KEY_LABELS
        .iter()
        .position(|&l| l == label)
        .map(|idx| u4::new(idx as u8))
}

/// Held state of the 16-key hex keypad.
#[derive(Debug, Clone, Default)]
pub struct Keypad {
    keys: [bool; 16],
}

impl Keypad {
    pub fn is_down(&self, key: u4) -> bool {
        self.keys[key]
    }

    pub fn set(&mut self, key: u4, pressed: bool) {
        self.keys[key] = pressed;
    }

    pub fn state(&self) -> &[bool; 16] {
        &self.keys
    }

    pub fn release_all(&mut self) {
        self.keys = [false; 16];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_map_to_logical_keys() {
        assert_eq!(key_for_label('x'), Some(u4::new(0x0)));
        assert_eq!(key_for_label('Y'), Some(u4::new(0xA)));
        assert_eq!(key_for_label('4'), Some(u4::new(0xC)));
        assert_eq!(key_for_label('v'), Some(u4::new(0xF)));
        assert_eq!(key_for_label('z'), None);
    }

    #[test]
    fn press_and_release() {
        let mut keypad = Keypad::default();
        keypad.set(u4::new(7), true);
        assert!(keypad.is_down(u4::new(7)));
        keypad.release_all();
        assert!(!keypad.is_down(u4::new(7)));
    }
}
