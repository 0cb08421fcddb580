use crate::BackendFactory;
use crate::case::{TckCase, TckSuite};
use crate::support::{process, run_processes};

const ACCEPTOR: &str = "process0";
const REQUESTER: &str = "process1";

pub(crate) fn suite<F: BackendFactory>() -> TckSuite<F> {
    TckSuite {
        name: "vectors",
        cases: vec![
            TckCase {
                name: "fixed_arrays_round_trip",
                test: fixed_arrays_round_trip::<F>,
            },
            TckCase {
                name: "sequences_replace_receiver_contents",
                test: sequences_replace_receiver_contents::<F>,
            },
            TckCase {
                name: "mixed_categories_keep_stream_order",
                test: mixed_categories_keep_stream_order::<F>,
            },
        ],
    }
}

/// 三元素浮点数组：全 1 出、全 2 回；四元素整数数组：全 1 出、全 0 回。
fn fixed_arrays_round_trip<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection(ACCEPTOR, REQUESTER)
                    .expect("接受方建立连接");

                let mut doubles = [0.0_f64; 3];
                channel.receive_array(&mut doubles, 0).expect("接收浮点数组");
                assert_eq!(doubles, [1.0; 3]);
                channel.send_array(&[2.0_f64; 3], 0).expect("发送浮点数组");

                let mut ints = [0_i32; 4];
                channel.receive_array(&mut ints, 0).expect("接收整数数组");
                assert_eq!(ints, [1; 4]);
                channel.send_array(&[0_i32; 4], 0).expect("发送整数数组");

                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection(ACCEPTOR, REQUESTER, 0, 1)
                    .expect("请求方建立连接");

                let mut doubles = [1.0_f64; 3];
                channel.send_array(&doubles, 0).expect("发送浮点数组");
                channel.receive_array(&mut doubles, 0).expect("接收浮点数组");
                assert_eq!(doubles, [2.0; 3]);

                let mut ints = [1_i32; 4];
                channel.send_array(&ints, 0).expect("发送整数数组");
                channel.receive_array(&mut ints, 0).expect("接收整数数组");
                assert_eq!(ints, [0; 4]);

                channel.close_connection().expect("关闭");
            }),
        ],
    );
}

/// 接收方从空序列出发，接收后恰好持有发送方的元素；原样回传后发送方得到同一序列。
/// 空序列同样清空接收方原有内容。
fn sequences_replace_receiver_contents<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection(ACCEPTOR, REQUESTER)
                    .expect("接受方建立连接");

                let mut ints: Vec<i32> = Vec::new();
                let count = channel.receive_sequence(&mut ints, 0).expect("接收整数序列");
                assert_eq!(count, 3);
                assert_eq!(ints, vec![1, 2, 3]);
                channel.send_sequence(&ints, 0).expect("回传整数序列");

                let mut doubles: Vec<f64> = Vec::new();
                channel
                    .receive_sequence(&mut doubles, 0)
                    .expect("接收浮点序列");
                assert_eq!(doubles, vec![1.1, 2.2, 3.3]);
                channel.send_sequence(&doubles, 0).expect("回传浮点序列");

                let mut leftovers = vec![9_u64, 9, 9];
                let count = channel
                    .receive_sequence(&mut leftovers, 0)
                    .expect("接收空序列");
                assert_eq!(count, 0);
                assert!(leftovers.is_empty());

                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection(ACCEPTOR, REQUESTER, 0, 1)
                    .expect("请求方建立连接");

                let mut ints = vec![1_i32, 2, 3];
                channel.send_sequence(&ints, 0).expect("发送整数序列");
                channel.receive_sequence(&mut ints, 0).expect("接收整数序列");
                assert_eq!(ints, vec![1, 2, 3]);

                let mut doubles = vec![1.1_f64, 2.2, 3.3];
                channel.send_sequence(&doubles, 0).expect("发送浮点序列");
                channel
                    .receive_sequence(&mut doubles, 0)
                    .expect("接收浮点序列");
                assert_eq!(doubles, vec![1.1, 2.2, 3.3]);

                channel
                    .send_sequence::<u64>(&[], 0)
                    .expect("发送空序列");

                channel.close_connection().expect("关闭");
            }),
        ],
    );
}

/// 同一端点上不同类别的消息按发送顺序到达。
fn mixed_categories_keep_stream_order<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection(ACCEPTOR, REQUESTER)
                    .expect("接受方建立连接");
                channel.send(&"header".to_string(), 0).expect("发送字符串");
                channel.send_sequence(&[5_u32, 6], 0).expect("发送序列");
                channel.send_array(&[true, false, true], 0).expect("发送数组");
                channel.send(&42_i64, 0).expect("发送整数");
                assert!(channel.receive::<bool>(0).expect("接收确认"));
                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection(ACCEPTOR, REQUESTER, 0, 1)
                    .expect("请求方建立连接");
                assert_eq!(channel.receive::<String>(0).expect("接收字符串"), "header");
                let mut sequence = Vec::new();
                channel.receive_sequence::<u32>(&mut sequence, 0).expect("接收序列");
                assert_eq!(sequence, vec![5, 6]);
                let mut flags = [false; 3];
                channel.receive_array(&mut flags, 0).expect("接收数组");
                assert_eq!(flags, [true, false, true]);
                assert_eq!(channel.receive::<i64>(0).expect("接收整数"), 42);
                channel.send(&true, 0).expect("发送确认");
                channel.close_connection().expect("关闭");
            }),
        ],
    );
}
