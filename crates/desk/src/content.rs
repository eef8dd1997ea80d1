pub const SYSTEM_INSTRUCTION: &str = include_str!("../assets/system_instruction.md");

pub const WELCOME_GREETING: &str = "Dạ em chào Anh/Chị! Em là chuyên viên hỗ trợ kỹ thuật của Thái Khương Pump. Em có thể hỗ trợ thông số chi tiết, tư vấn chọn bơm (Lưu lượng, Cột áp) cho các dòng bơm màng, bơm ly tâm, bơm bánh răng... Anh/Chị đang quan tâm dòng nào ạ?";

pub const RESET_GREETING: &str =
    "Cuộc trò chuyện đã được đặt lại. Em có thể giúp gì khác cho Anh/Chị ạ?";

pub const STREAM_APOLOGY: &str =
    "Xin lỗi, em đang gặp sự cố kết nối. Anh/Chị vui lòng thử lại sau nhé.";

pub const SESSION_INIT_ERROR: &str = "Lỗi khởi tạo kết nối. Vui lòng tải lại trang.";

pub const TYPING_INDICATOR: &str = "đang trả lời…";

pub const BUSY_NOTICE: &str = "Em đang trả lời câu trước, tin nhắn này chưa được gửi. Gõ /stop để dừng.";

/// Canned technical question sent through the normal send path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub label: &'static str,
    pub query: &'static str,
}

pub const QUICK_ACTIONS: [QuickAction; 3] = [
    QuickAction {
        label: "Hướng dẫn Lắp đặt",
        query: "Hãy hướng dẫn những lưu ý quan trọng khi lắp đặt máy bơm công nghiệp (Bơm ly tâm, Bơm màng)?",
    },
    QuickAction {
        label: "Bảo trì định kỳ",
        query: "Quy trình bảo trì bảo dưỡng máy bơm cần làm những gì để đảm bảo độ bền?",
    },
    QuickAction {
        label: "Khắc phục sự cố",
        query: "Liệt kê các lỗi thường gặp của máy bơm (không lên nước, rung, ồn) và cách khắc phục?",
    },
];

pub fn quick_action(index: usize) -> Option<&'static QuickAction> {
    QUICK_ACTIONS.get(index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Office {
    pub name: &'static str,
    pub address: &'static str,
    pub phone: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactCard {
    pub company: &'static str,
    pub hotline: &'static str,
    pub email: &'static str,
    pub hours: [&'static str; 2],
    pub offices: [Office; 4],
}

pub const CONTACT_CARD: ContactCard = ContactCard {
    company: "Thai Khuong Pump",
    hotline: "0941.400.488",
    email: "info@thaikhuongpump.com",
    hours: ["T2 - T6: 08:00 - 17:30", "Thứ 7: 08:00 - 12:00"],
    offices: [
        Office {
            name: "Trụ Sở Chính (TP. Hồ Chí Minh)",
            address: "30D Phan Văn Sửu, Phường 13, Quận Tân Bình, TP. Hồ Chí Minh.",
            phone: None,
        },
        Office {
            name: "Văn Phòng Hà Nội",
            address: "22 - 24 VP6 Linh Đàm, Phường Hoàng Liệt, Quận Hoàng Mai, TP. Hà Nội.",
            phone: Some("(+84) 242 2040 101"),
        },
        Office {
            name: "Văn Phòng Đà Nẵng",
            address: "01 Tiên Sơn 5, Phường Hoà Cường, Quận Hải Châu, TP. Đà Nẵng.",
            phone: Some("(+84) 236 3538 356 / 57"),
        },
        Office {
            name: "Kho - Xưởng Kỹ Thuật",
            address: "6 Đường Tân Thới Nhất 18, Phường Đông Hưng Thuận, Quận 12, TP. Hồ Chí Minh.",
            phone: Some("(+84) 28 3620 6333 / 444"),
        },
    ],
};
