use crate::BackendFactory;
use crate::case::{TckCase, TckSuite};
use crate::support::{process, run_processes};

const ACCEPTOR: &str = "process0";
const REQUESTER: &str = "process1";

pub(crate) fn suite<F: BackendFactory>() -> TckSuite<F> {
    TckSuite {
        name: "primitives",
        cases: vec![
            TckCase {
                name: "scalars_round_trip_in_both_directions",
                test: scalars_round_trip_in_both_directions::<F>,
            },
            TckCase {
                name: "boundary_scalars_survive_the_wire",
                test: boundary_scalars_survive_the_wire::<F>,
            },
        ],
    }
}

/// 直连一对进程，按字符串、浮点、整数、布尔的顺序各往返一次，每次回程值与去程值不同。
fn scalars_round_trip_in_both_directions<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection(ACCEPTOR, REQUESTER)
                    .expect("接受方建立连接");
                assert_eq!(channel.local_ranks(), vec![0]);

                channel.send(&"testOne".to_string(), 0).expect("发送字符串");
                assert_eq!(channel.receive::<String>(0).expect("接收字符串"), "testTwo");

                channel.send(&0.0_f64, 0).expect("发送浮点");
                assert_eq!(channel.receive::<f64>(0).expect("接收浮点"), 1.0);

                channel.send(&1_i32, 0).expect("发送整数");
                assert_eq!(channel.receive::<i32>(0).expect("接收整数"), 2);

                channel.send(&true, 0).expect("发送布尔");
                assert!(!channel.receive::<bool>(0).expect("接收布尔"));

                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection(ACCEPTOR, REQUESTER, 0, 1)
                    .expect("请求方建立连接");

                assert_eq!(channel.receive::<String>(0).expect("接收字符串"), "testOne");
                channel.send(&"testTwo".to_string(), 0).expect("发送字符串");

                assert_eq!(channel.receive::<f64>(0).expect("接收浮点"), 0.0);
                channel.send(&1.0_f64, 0).expect("发送浮点");

                assert_eq!(channel.receive::<i32>(0).expect("接收整数"), 1);
                channel.send(&2_i32, 0).expect("发送整数");

                assert!(channel.receive::<bool>(0).expect("接收布尔"));
                channel.send(&false, 0).expect("发送布尔");

                channel.close_connection().expect("关闭");
            }),
        ],
    );
}

/// 极值、负零、空串与多字节字符在线上保持逐位一致。
fn boundary_scalars_survive_the_wire<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection(ACCEPTOR, REQUESTER)
                    .expect("接受方建立连接");
                channel.send(&i64::MIN, 0).expect("发送 i64");
                channel.send(&u64::MAX, 0).expect("发送 u64");
                channel.send(&u32::MAX, 0).expect("发送 u32");
                channel.send(&-0.0_f32, 0).expect("发送 f32");
                channel.send(&f64::MAX, 0).expect("发送 f64");
                channel.send(&String::new(), 0).expect("发送空串");
                channel.send(&"耦合 ✓".to_string(), 0).expect("发送多字节串");
                assert_eq!(channel.receive::<i32>(0).expect("接收确认"), 7);
                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection(ACCEPTOR, REQUESTER, 0, 1)
                    .expect("请求方建立连接");
                assert_eq!(channel.receive::<i64>(0).expect("接收 i64"), i64::MIN);
                assert_eq!(channel.receive::<u64>(0).expect("接收 u64"), u64::MAX);
                assert_eq!(channel.receive::<u32>(0).expect("接收 u32"), u32::MAX);
                let negative_zero = channel.receive::<f32>(0).expect("接收 f32");
                assert_eq!(negative_zero.to_bits(), (-0.0_f32).to_bits());
                assert_eq!(channel.receive::<f64>(0).expect("接收 f64"), f64::MAX);
                assert_eq!(channel.receive::<String>(0).expect("接收空串"), "");
                assert_eq!(channel.receive::<String>(0).expect("接收多字节串"), "耦合 ✓");
                channel.send(&7_i32, 0).expect("发送确认");
                channel.close_connection().expect("关闭");
            }),
        ],
    );
}
